use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_positive_f64, parse_u16, parse_u32, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, JudgeSettings,
    RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMHALL_HOST", "0.0.0.0");
        let port = env_or_default("EXAMHALL_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAMHALL_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("EXAMHALL_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examhall API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "examhall");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "examhall_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "30"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let judge_base_url = env_or_default("JUDGE0_BASE_URL", "http://localhost:2358");
        let judge_api_key = env_or_default("JUDGE0_API_KEY", "");
        let judge_api_key_header = env_or_default("JUDGE0_API_KEY_HEADER", "X-Auth-Token");
        let cpu_time_limit_seconds = parse_positive_f64(
            "JUDGE0_CPU_TIME_LIMIT",
            env_or_default("JUDGE0_CPU_TIME_LIMIT", "2"),
        )?;
        let request_timeout_seconds = parse_u64(
            "JUDGE0_REQUEST_TIMEOUT",
            env_or_default("JUDGE0_REQUEST_TIMEOUT", "20"),
        )?;
        let max_retries =
            parse_u32("JUDGE0_MAX_RETRIES", env_or_default("JUDGE0_MAX_RETRIES", "2"))?;
        let call_timeout_seconds = env_optional("JUDGE0_CALL_TIMEOUT")
            .map(|value| parse_u64("JUDGE0_CALL_TIMEOUT", value))
            .transpose()?;

        let violation_limit =
            parse_u32("EXAM_VIOLATION_LIMIT", env_or_default("EXAM_VIOLATION_LIMIT", "3"))?;
        let run_code_limit =
            parse_u64("RUN_CODE_RATE_LIMIT", env_or_default("RUN_CODE_RATE_LIMIT", "10"))?;
        let run_code_window_seconds = parse_u64(
            "RUN_CODE_RATE_WINDOW_SECONDS",
            env_or_default("RUN_CODE_RATE_WINDOW_SECONDS", "60"),
        )?;
        let stale_judge_run_minutes = parse_u64(
            "STALE_JUDGE_RUN_MINUTES",
            env_or_default("STALE_JUDGE_RUN_MINUTES", "10"),
        )?;
        let maintenance_interval_seconds = parse_u64(
            "MAINTENANCE_INTERVAL_SECONDS",
            env_or_default("MAINTENANCE_INTERVAL_SECONDS", "30"),
        )?;

        let log_level = env_or_default("EXAMHALL_LOG_LEVEL", "info");
        let json = env_optional("EXAMHALL_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
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
            judge: JudgeSettings {
                base_url: judge_base_url.trim_end_matches('/').to_string(),
                api_key: judge_api_key,
                api_key_header: judge_api_key_header,
                cpu_time_limit_seconds,
                request_timeout_seconds,
                max_retries,
                call_timeout_seconds,
            },
            exam: ExamSettings {
                violation_limit,
                run_code_limit,
                run_code_window_seconds,
                stale_judge_run_minutes,
                maintenance_interval_seconds,
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

    pub(crate) fn judge(&self) -> &JudgeSettings {
        &self.judge
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exam.violation_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_VIOLATION_LIMIT",
                value: String::from("0"),
            });
        }
        if self.judge.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "JUDGE0_REQUEST_TIMEOUT",
                value: String::from("0"),
            });
        }
        if self.judge.call_timeout_seconds == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "JUDGE0_CALL_TIMEOUT",
                value: String::from("0"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.judge.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("JUDGE0_BASE_URL"));
        }

        Ok(())
    }
}
