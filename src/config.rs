use std::env;

const DEFAULT_SCORE_REFRESH_WINDOW_HOURS: u32 = 72;
// One year; older comments have fully decayed scores.
const MAX_SCORE_REFRESH_WINDOW_HOURS: u32 = 24 * 365;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,

    // Voting
    pub vote_max_attempts: u32,

    // Score refresh job
    pub score_refresh_interval_secs: u64,
    pub score_refresh_window_hours: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: env::var("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),

            vote_max_attempts: env::var("VOTE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(3),

            // 0 disables the refresh loop
            score_refresh_interval_secs: env::var("SCORE_REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .unwrap_or(900),
            score_refresh_window_hours: parse_refresh_window_hours(
                env::var("SCORE_REFRESH_WINDOW_HOURS").ok().as_deref(),
            ),
        })
    }
}

// Missing, unparsable, zero or out-of-range values fall back to the default
fn parse_refresh_window_hours(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|hours| (1..=MAX_SCORE_REFRESH_WINDOW_HOURS).contains(hours))
        .unwrap_or(DEFAULT_SCORE_REFRESH_WINDOW_HOURS)
}
