use std::time::Duration;

use shipyard_codegen::CodegenConfig;

/// Default seconds of runner silence before a running job is failed.
pub const DEFAULT_RUNNER_STALE_SECS: u64 = 900;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Shared secret runners present as a bearer token. When unset, the
    /// runner endpoints answer 503.
    pub runner_secret: Option<String>,
    /// Seconds without a runner report after which a running job is failed.
    /// `0` disables the reaper.
    pub runner_stale_secs: u64,
    /// Code-generation service used by auto-fix.
    pub codegen: CodegenConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `RUNNER_SECRET`        | unset (runner API off)     |
    /// | `RUNNER_STALE_SECS`    | `900`                      |
    /// | `CODEGEN_URL`          | `http://localhost:8080`    |
    /// | `CODEGEN_API_KEY`      | unset                      |
    /// | `CODEGEN_TIMEOUT_SECS` | `300`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let runner_secret = non_empty_var("RUNNER_SECRET");

        let runner_stale_secs: u64 = std::env::var("RUNNER_STALE_SECS")
            .unwrap_or_else(|_| DEFAULT_RUNNER_STALE_SECS.to_string())
            .parse()
            .expect("RUNNER_STALE_SECS must be a valid u64");

        let codegen_timeout_secs: u64 = std::env::var("CODEGEN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("CODEGEN_TIMEOUT_SECS must be a valid u64");

        let codegen = CodegenConfig {
            base_url: std::env::var("CODEGEN_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            api_key: non_empty_var("CODEGEN_API_KEY"),
            timeout: Duration::from_secs(codegen_timeout_secs),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            runner_secret,
            runner_stale_secs,
            codegen,
        }
    }

    /// The reaper threshold, or `None` when the reaper is disabled.
    pub fn runner_stale_after(&self) -> Option<Duration> {
        (self.runner_stale_secs > 0).then(|| Duration::from_secs(self.runner_stale_secs))
    }

    /// Timeout for the auto-fix route: the code generator's budget plus the
    /// regular request timeout for the store work around it.
    pub fn auto_fix_timeout(&self) -> Duration {
        self.codegen.timeout + Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_fix_timeout_covers_the_generator_budget() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
            runner_secret: None,
            runner_stale_secs: 0,
            codegen: CodegenConfig {
                base_url: "http://localhost:8080".into(),
                api_key: None,
                timeout: Duration::from_secs(300),
            },
        };
        assert_eq!(config.auto_fix_timeout(), Duration::from_secs(330));
        assert!(config.runner_stale_after().is_none());
    }
}

/// An env var treated as unset when empty or whitespace.
fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
