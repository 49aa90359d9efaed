use coke::{OpCode, Options, Runner};
use logger::Logger;

fn run() -> Result<(), OpCode> {
    let opt = Options::from_env().validate()?;
    let report = Runner::new(opt)?.run()?;
    if report.abandoned > 0 {
        log::info!("exit with {} workers abandoned", report.abandoned);
    }
    Ok(())
}

fn main() {
    let logger = Logger::init().add_console();
    log::set_max_level(log::LevelFilter::Info);

    let rc = match run() {
        Ok(()) => 0,
        Err(e) => {
            log::error!("coke machine stopped: {}", e);
            1
        }
    };
    // exiting ends the process, workers still parked in the machine go with it
    logger.flush();
    std::process::exit(rc);
}
