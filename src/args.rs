use std::time::Duration;
use structopt::StructOpt;

fn parse_log_level(l: &str) -> tracing::Level {
    match &l.to_lowercase()[..] {
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

fn parse_timeout(l: &str) -> Result<Duration, std::num::ParseIntError> {
    Ok(Duration::from_secs(l.parse()?))
}

#[derive(StructOpt, Debug, Clone)]
#[structopt(name = "ctunnel")]
pub struct Opt {
    /// Address to accept clients on
    #[structopt(short = "l", long = "listen", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Address every accepted client is relayed to
    #[structopt(short = "t", long = "target")]
    pub target_addr: String,

    /// Idle timeout in seconds, per direction
    #[structopt(long, default_value = "60", parse(try_from_str = parse_timeout))]
    pub timeout: Duration,

    #[structopt(long, default_value = "info", parse(from_str = parse_log_level))]
    pub log_level: tracing::Level,
}
