use std::panic;

use log::error;

/// Install pretty backtraces and make sure panics reach the log file.
///
/// The log is often the only record of a batch run, so the panic is written
/// there before the default hook prints it.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        error!("Panic at {location}: {}", panic_message(panic_info));
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}

fn panic_message(info: &panic::PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
