use chrono::Utc;
use log::info;
use std::io::Write;

pub struct ClientLogger;

impl ClientLogger {
    /// Installs the global logger. `RUST_LOG` wins over `level` when set.
    pub fn init(level: &str) -> Result<(), log::SetLoggerError> {
        env_logger::Builder::new()
            .parse_filters(level)
            .parse_default_env()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] [{}] [{}:{}] {}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .try_init()?;

        info!("QuickAssist logger initialized at '{}'", level);
        Ok(())
    }
}
