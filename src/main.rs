use clap::Parser;

use schema_delta::cli::Args;
use schema_delta::config::ConfigFile;
use schema_delta::db::DatabaseConfig;
use schema_delta::logging;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_file = ConfigFile::load().ok();
    logging::init_logging(config_file.as_ref().and_then(|c| c.log_filter()))?;

    let db_config = match &args.database_url {
        Some(url) => DatabaseConfig::from_url(url)?,
        None => DatabaseConfig::resolve()?,
    };
    let mut session = db_config.connect()?;
    let output = args.command.run(session.as_mut(), args.format)?;
    println!("{}", output.trim_end());
    Ok(())
}
