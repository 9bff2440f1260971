use std::time::Duration;

/// How the completion service is asked to produce JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// `{"type": "json_object"}`; the schema travels inside the instruction.
    JsonObject,
    /// `{"type": "json_schema"}`; the schema travels natively.
    JsonSchema,
}

impl std::str::FromStr for ResponseFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json_object" => Ok(ResponseFormat::JsonObject),
            "json_schema" => Ok(ResponseFormat::JsonSchema),
            other => anyhow::bail!(
                "COMPLETION_RESPONSE_FORMAT must be json_object or json_schema, got '{}'",
                other
            ),
        }
    }
}

/// Settings for one structured-completion client and the retry policy of
/// the stage using it. Passed explicitly to constructors.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub response_format: ResponseFormat,
}

impl CompletionConfig {
    /// Same client settings with another model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Completion settings for extraction.
    pub extraction: CompletionConfig,
    /// Completion settings for scoring (same service, optionally another model).
    pub scoring: CompletionConfig,
    /// LLMSherpa `parseDocument` endpoint.
    pub llmsherpa_api_url: String,
    pub max_upload_bytes: usize,
}

fn required(names: &[&str]) -> anyhow::Result<String> {
    let value = names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .ok_or_else(|| anyhow::anyhow!("{} environment variable required", names.join(" or ")))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", names[0]);
    }
    Ok(value.trim().to_string())
}

fn required_http_url(names: &[&str]) -> anyhow::Result<String> {
    let value = required(names)?;
    let parsed = url::Url::parse(&value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", names[0], e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", names[0]);
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T, hint: &str) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be {}", name, hint)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let temperature: f32 = parsed_or("COMPLETION_TEMPERATURE", 0.0, "a number")?;
        if !(0.0..=2.0).contains(&temperature) {
            anyhow::bail!("COMPLETION_TEMPERATURE must be between 0 and 2");
        }

        let timeout_secs: u64 = parsed_or("COMPLETION_TIMEOUT_SECS", 120, "a number of seconds")?;
        if timeout_secs == 0 {
            anyhow::bail!("COMPLETION_TIMEOUT_SECS must be greater than 0");
        }

        let max_retries: u32 = parsed_or("COMPLETION_MAX_RETRIES", 2, "a non-negative integer")?;
        if max_retries > 10 {
            anyhow::bail!("COMPLETION_MAX_RETRIES must be at most 10");
        }

        let response_format = match std::env::var("COMPLETION_RESPONSE_FORMAT") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => ResponseFormat::JsonObject,
        };

        let extraction = CompletionConfig {
            api_key: required(&["MODEL_STUDIO_API_KEY", "OPENAI_API_KEY"])?,
            base_url: required_http_url(&["MODEL_STUDIO_BASE_URL", "OPENAI_BASE_URL"])?,
            model: parsed_or("COMPLETION_MODEL", "qwen-turbo".to_string(), "a model name")?,
            temperature,
            request_timeout: Duration::from_secs(timeout_secs),
            max_retries,
            retry_backoff: Duration::from_millis(parsed_or(
                "COMPLETION_RETRY_BACKOFF_MS",
                250,
                "a number of milliseconds",
            )?),
            response_format,
        };

        let scoring = match std::env::var("SCORING_MODEL") {
            Ok(model) if !model.trim().is_empty() => extraction.with_model(model.trim()),
            _ => extraction.clone(),
        };

        let max_upload_mb: usize = parsed_or("MAX_UPLOAD_MB", 20, "a number of megabytes")?;
        if max_upload_mb == 0 {
            anyhow::bail!("MAX_UPLOAD_MB must be greater than 0");
        }

        let config = Self {
            port: parsed_or("PORT", 8000, "a valid number between 1-65535")?,
            extraction,
            scoring,
            llmsherpa_api_url: required_http_url(&["LLMSHERPA_API_URL"])?,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Completion base URL: {}", config.extraction.base_url);
        tracing::debug!(
            "Extraction model: {}, scoring model: {}",
            config.extraction.model,
            config.scoring.model
        );
        tracing::debug!(
            "Completion timeout: {:?}, retries: {}",
            config.extraction.request_timeout,
            config.extraction.max_retries
        );
        tracing::debug!("LLMSherpa URL: {}", config.llmsherpa_api_url);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_format_parse() {
        assert_eq!(
            "json_schema".parse::<ResponseFormat>().unwrap(),
            ResponseFormat::JsonSchema
        );
        assert_eq!(
            " JSON_OBJECT ".parse::<ResponseFormat>().unwrap(),
            ResponseFormat::JsonObject
        );
        assert!("xml".parse::<ResponseFormat>().is_err());
    }

    #[test]
    fn test_with_model_keeps_other_settings() {
        let base = CompletionConfig {
            api_key: "key".to_string(),
            base_url: "https://dashscope.example.com/v1".to_string(),
            model: "qwen-turbo".to_string(),
            temperature: 0.0,
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::ZERO,
            response_format: ResponseFormat::JsonObject,
        };
        let scoring = base.with_model("qwen-plus");

        assert_eq!(scoring.model, "qwen-plus");
        assert_eq!(scoring.base_url, base.base_url);
        assert_eq!(scoring.max_retries, 2);
    }
}
