use std::time::Duration;

/// Echo API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC secret used to sign and verify session tokens.
    pub jwt_secret: String,
    /// Lifetime of newly issued session tokens.
    pub jwt_ttl: Duration,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Chat actions allowed per identity per window.
    pub ws_rate_limit_max: u32,
    /// Length of the chat rate-limit window.
    pub ws_rate_limit_window: Duration,
    /// Connections silent for longer than this are closed by the sweeper.
    pub ws_idle_timeout: Duration,
    /// How often the liveness sweep runs.
    pub ws_sweep_interval: Duration,
    /// Lower bound of the randomized assistant reply delay.
    pub assistant_delay_min: Duration,
    /// Upper bound of the randomized assistant reply delay.
    pub assistant_delay_max: Duration,
    /// Chat history older than this is purged.
    pub message_retention: Duration,
}

impl Config {
    /// Defaults for everything except the signing secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_ttl: Duration::from_secs(7 * 24 * 3600),
            port: 10000,
            ws_rate_limit_max: 20,
            ws_rate_limit_window: Duration::from_secs(60),
            ws_idle_timeout: Duration::from_secs(5 * 60),
            ws_sweep_interval: Duration::from_secs(60),
            assistant_delay_min: Duration::from_millis(2000),
            assistant_delay_max: Duration::from_millis(5000),
            message_retention: Duration::from_secs(30 * 24 * 3600),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unset optional variables fall back to [`Config::new`]. Panics with a
    /// descriptive message if a required variable is missing or a set
    /// variable does not parse.
    pub fn from_env() -> Self {
        let defaults = Self::new(required_var("JWT_SECRET"));
        Self {
            jwt_ttl: std::env::var("JWT_EXPIRE")
                .ok()
                .map(|v| {
                    parse_duration(&v)
                        .unwrap_or_else(|| panic!("JWT_EXPIRE has an invalid duration: {v}"))
                })
                .unwrap_or(defaults.jwt_ttl),
            port: parsed_var("PORT").unwrap_or(defaults.port),
            ws_rate_limit_max: parsed_var("WS_RATE_LIMIT_MAX").unwrap_or(defaults.ws_rate_limit_max),
            ws_rate_limit_window: parsed_var("WS_RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ws_rate_limit_window),
            ws_idle_timeout: parsed_var("WS_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ws_idle_timeout),
            ws_sweep_interval: parsed_var("WS_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ws_sweep_interval),
            assistant_delay_min: parsed_var("ASSISTANT_DELAY_MIN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.assistant_delay_min),
            assistant_delay_max: parsed_var("ASSISTANT_DELAY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.assistant_delay_max),
            message_retention: parsed_var::<u64>("MESSAGE_RETENTION_DAYS")
                .map(retention_from_days)
                .unwrap_or(defaults.message_retention),
            ..defaults
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().map(|v| parse_value(name, &v))
}

fn parse_value<T: std::str::FromStr>(name: &str, raw: &str) -> T {
    raw.trim()
        .parse()
        .unwrap_or_else(|_| panic!("{name} has an invalid value: {raw:?}"))
}

fn retention_from_days(days: u64) -> Duration {
    days.checked_mul(24 * 3600)
        .map(Duration::from_secs)
        .unwrap_or_else(|| panic!("MESSAGE_RETENTION_DAYS is too large: {days}"))
}

/// Parse `90`, `45s`, `30m`, `12h` or `7d` into a duration. Bare numbers are seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    let secs = match unit {
        "" | "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(3600)?,
        "d" => amount.checked_mul(24 * 3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
