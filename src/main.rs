use std::process::ExitCode;

fn main() -> ExitCode {
    match widget_sync_lib::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
