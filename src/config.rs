//! Environment configuration.
//!
//! Values come from the process environment, after a `.env` file has been
//! loaded by [`crate::App::new`]. A variable that is set but does not parse is
//! an error rather than a silent fallback to the default.

use std::{env, str::FromStr};

use anyhow::Context;

use crate::{
    counter::{IncrementStrategy, InitPolicy},
    visits::{Report, ResponseFormat, VisitsView},
};

pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub pem_cert: String,
    pub pem_key: String,
}

/// Store and counter behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitsConfig {
    pub redis_url: String,
    pub increment: IncrementStrategy,
    pub init: InitPolicy,
    pub view: VisitsView,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind = env::var("SERVER_BIND").unwrap_or("0.0.0.0".into());
        let port = match parsed_var("SERVER_PORT")? {
            Some(port) => port,
            None => parsed_var("PORT")?.unwrap_or(DEFAULT_PORT),
        };
        let tls = if env::var("TLS").is_ok() {
            Some(TlsConfig {
                pem_cert: env::var("TLS_PEM_CERT").context("TLS is set but TLS_PEM_CERT is not")?,
                pem_key: env::var("TLS_PEM_KEY").context("TLS is set but TLS_PEM_KEY is not")?,
            })
        } else {
            None
        };
        Ok(Self { bind, port, tls })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl VisitsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let format: ResponseFormat = parsed_var("VISITS_RESPONSE")?.unwrap_or_default();
        let report = parsed_var("VISITS_REPORT")?.unwrap_or(Report::default_for(format));
        Ok(Self {
            redis_url: env::var("REDIS_URL").unwrap_or(DEFAULT_REDIS_URL.into()),
            increment: parsed_var("VISITS_INCREMENT")?.unwrap_or_default(),
            init: parsed_var("VISITS_INIT")?.unwrap_or_default(),
            view: VisitsView { format, report },
        })
    }
}

fn parsed_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {name}={value:?}: {e}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("cannot read {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "SERVER_BIND",
        "SERVER_PORT",
        "PORT",
        "TLS",
        "TLS_PEM_CERT",
        "TLS_PEM_KEY",
        "REDIS_URL",
        "VISITS_RESPONSE",
        "VISITS_REPORT",
        "VISITS_INCREMENT",
        "VISITS_INIT",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults() {
        clear();
        let server = ServerConfig::from_env().unwrap();
        assert_eq!(server.addr(), "0.0.0.0:4001");
        assert!(server.tls.is_none());

        let visits = VisitsConfig::from_env().unwrap();
        assert_eq!(visits.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(visits.increment, IncrementStrategy::ReadWrite);
        assert_eq!(visits.init, InitPolicy::Reset);
        assert_eq!(visits.view.format, ResponseFormat::Text);
        assert_eq!(visits.view.report, Report::Previous);
    }

    #[test]
    #[serial]
    fn port_falls_back_to_port_variable() {
        clear();
        env::set_var("PORT", "3000");
        assert_eq!(ServerConfig::from_env().unwrap().port, 3000);
        env::set_var("SERVER_PORT", "8080");
        assert_eq!(ServerConfig::from_env().unwrap().port, 8080);
        clear();
    }

    #[test]
    #[serial]
    fn json_reports_current_unless_overridden() {
        clear();
        env::set_var("VISITS_RESPONSE", "json");
        let visits = VisitsConfig::from_env().unwrap();
        assert_eq!(visits.view.format, ResponseFormat::Json);
        assert_eq!(visits.view.report, Report::Current);

        env::set_var("VISITS_REPORT", "previous");
        assert_eq!(VisitsConfig::from_env().unwrap().view.report, Report::Previous);
        clear();
    }

    #[test]
    #[serial]
    fn invalid_values_are_errors() {
        clear();
        env::set_var("SERVER_PORT", "eighty");
        assert!(ServerConfig::from_env().is_err());
        clear();
        env::set_var("VISITS_INCREMENT", "sometimes");
        assert!(VisitsConfig::from_env().is_err());
        clear();
        env::set_var("TLS", "1");
        assert!(ServerConfig::from_env().is_err());
        clear();
    }
}
