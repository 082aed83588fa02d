pub fn print_startup_banner() {
    const RESET: &str = "\x1b[0m";
    const BANNER_COLOR: &str = "\x1b[38;5;130m";
    const DIM_GRAY: &str = "\x1b[2;90m";
    const BANNER: &str = r#"
   ___  _         _         ___       _
  | _ \(_)_ _ __ _| |_ ___  | _ ) __ _| |__ _ _ _  __ ___ _ _
  |  _/| | '_/ _` |  _/ -_) | _ \/ _` | / _` | ' \/ _/ -_) '_|
  |_|  |_|_| \__,_|\__\___| |___/\__,_|_\__,_|_||_\__\___|_|"#;
    const APP_DESCRIPTION: &str =
        "Paranoid Pirate load balancer: heartbeat-checked workers behind a client frontend.";
    const LIABILITY_NOTICE: &str =
        "MIT License disclaimer: software is provided \"AS IS\", without warranty or liability.";

    println!("{BANNER_COLOR}{BANNER}{RESET}");
    println!();
    println!(
        "{} v{} | build {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("BALANCER_BUILD_DATE_UTC"),
        env!("BALANCER_BUILD_PROFILE")
    );
    println!("{APP_DESCRIPTION}");
    println!("{DIM_GRAY}{LIABILITY_NOTICE}{RESET}");
    println!();
}
