use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u16,
    parse_u32, parse_u64, parse_webhook_url,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamEngineSettings,
    NotificationSettings, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost,
    ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMFLOW_HOST", "0.0.0.0");
        let port = env_or_default("EXAMFLOW_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAMFLOW_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config =
            env_optional("EXAMFLOW_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examflow API");
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let explicit_secret = env_optional("SECRET_KEY");
        if explicit_secret.is_none() && strict_config {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        let secret_key = explicit_secret.unwrap_or_else(load_or_create_secret_key);
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "examflow");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "examflow");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "20"),
        )?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let expiry_sweep_interval_seconds = parse_u64(
            "EXPIRY_SWEEP_INTERVAL_SECONDS",
            env_or_default("EXPIRY_SWEEP_INTERVAL_SECONDS", "20"),
        )?;
        let expiry_sweep_batch_size = parse_u32(
            "EXPIRY_SWEEP_BATCH_SIZE",
            env_or_default("EXPIRY_SWEEP_BATCH_SIZE", "200"),
        )?;
        let save_rate_limit =
            parse_u64("SAVE_RATE_LIMIT", env_or_default("SAVE_RATE_LIMIT", "120"))?;
        let save_rate_window_seconds = parse_u64(
            "SAVE_RATE_WINDOW_SECONDS",
            env_or_default("SAVE_RATE_WINDOW_SECONDS", "60"),
        )?;
        let clock_drift_warn_seconds = parse_u64(
            "CLOCK_DRIFT_WARN_SECONDS",
            env_or_default("CLOCK_DRIFT_WARN_SECONDS", "30"),
        )?;

        let webhook_url = parse_webhook_url(env_optional("NOTIFICATION_WEBHOOK_URL"))?;
        let notification_timeout_seconds = parse_u64(
            "NOTIFICATION_TIMEOUT_SECONDS",
            env_or_default("NOTIFICATION_TIMEOUT_SECONDS", "10"),
        )?;

        let log_level = env_or_default("EXAMFLOW_LOG_LEVEL", "info");
        let json =
            env_optional("EXAMFLOW_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            exam: ExamEngineSettings {
                expiry_sweep_interval_seconds,
                expiry_sweep_batch_size,
                save_rate_limit,
                save_rate_window_seconds,
                clock_drift_warn_seconds,
            },
            notifications: NotificationSettings {
                webhook_url,
                timeout_seconds: notification_timeout_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn exam(&self) -> &ExamEngineSettings {
        &self.exam
    }

    pub(crate) fn notifications(&self) -> &NotificationSettings {
        &self.notifications
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.security.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue {
                field: "ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        let positive = [
            ("DATABASE_MAX_CONNECTIONS", u64::from(self.database.max_connections)),
            ("EXPIRY_SWEEP_INTERVAL_SECONDS", self.exam.expiry_sweep_interval_seconds),
            ("EXPIRY_SWEEP_BATCH_SIZE", u64::from(self.exam.expiry_sweep_batch_size)),
            ("SAVE_RATE_LIMIT", self.exam.save_rate_limit),
            ("SAVE_RATE_WINDOW_SECONDS", self.exam.save_rate_window_seconds),
            ("NOTIFICATION_TIMEOUT_SECONDS", self.notifications.timeout_seconds),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue { field, value: "0".to_string() });
            }
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use crate::core::config::types::ConfigError;
    use crate::test_support;

    #[tokio::test]
    async fn defaults_load_with_secret_present() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.server_port(), 8000);
        assert_eq!(settings.exam().expiry_sweep_interval_seconds, 20);
        assert_eq!(settings.exam().expiry_sweep_batch_size, 200);
        assert!(settings.notifications().webhook_url.is_none());
        assert_eq!(settings.api().api_v1_str, "/api/v1");
    }

    #[tokio::test]
    async fn zero_sweep_interval_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("EXPIRY_SWEEP_INTERVAL_SECONDS", "0");

        let result = Settings::load();
        std::env::remove_var("EXPIRY_SWEEP_INTERVAL_SECONDS");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "EXPIRY_SWEEP_INTERVAL_SECONDS", .. })
        ));
    }

    #[tokio::test]
    async fn strict_mode_requires_secret_key() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::remove_var("SECRET_KEY");
        std::env::set_var("EXAMFLOW_STRICT_CONFIG", "1");

        let result = Settings::load();
        std::env::set_var("EXAMFLOW_STRICT_CONFIG", "0");
        test_support::set_test_env();

        assert!(matches!(result, Err(ConfigError::MissingSecret("SECRET_KEY"))));
    }
}
