use std::process;

pub const EXIT_BROKER_FAILURE: i32 = 1;
pub const EXIT_STARTUP_FAILURE: i32 = 2;

pub fn ensure_posix_or_exit() {
    if !cfg!(unix) {
        eprintln!("unsupported platform: the balancer is intended for POSIX systems");
        process::exit(EXIT_STARTUP_FAILURE);
    }
}

pub fn exit_startup_failure(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(EXIT_STARTUP_FAILURE);
}
