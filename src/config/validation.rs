use crate::config::types::{
    Config, DetailConfig, EnrichmentConfig, ListingConfig, OutputConfig, RetryConfig,
    ScoringConfig, ServicesConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_listing_config(&config.listing)?;
    validate_detail_config(&config.detail)?;
    validate_enrichment_config(&config.enrichment)?;
    validate_retry_config(&config.retry)?;
    validate_scoring_config(&config.scoring)?;
    validate_services_config(&config.services)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates listing pagination settings
fn validate_listing_config(config: &ListingConfig) -> Result<(), ConfigError> {
    if !config.url_template.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "url_template must contain a {{page}} placeholder, got '{}'",
            config.url_template
        )));
    }

    let sample = config.page_url(config.start_page);
    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid url_template: {}", e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "url_template must use HTTP or HTTPS, got '{}'",
            url.scheme()
        )));
    }

    if config.start_page > config.end_page {
        return Err(ConfigError::Validation(format!(
            "start_page ({}) must not exceed end_page ({})",
            config.start_page, config.end_page
        )));
    }

    if config.empty_threshold < 1 {
        return Err(ConfigError::Validation(
            "empty_threshold must be >= 1".to_string(),
        ));
    }

    if config.duplicate_threshold < 1 {
        return Err(ConfigError::Validation(
            "duplicate_threshold must be >= 1".to_string(),
        ));
    }

    if config.min_sample < 1 {
        return Err(ConfigError::Validation(
            "min_sample must be >= 1".to_string(),
        ));
    }

    validate_selector("link_selector", &config.link_selector)?;
    if let Some(wait) = &config.wait_selector {
        validate_selector("wait_selector", wait)?;
    }

    Ok(())
}

/// Validates detail extraction settings
fn validate_detail_config(config: &DetailConfig) -> Result<(), ConfigError> {
    validate_selector("title_selector", &config.title_selector)?;
    validate_selector("body_selector", &config.body_selector)?;
    validate_selector("image_selector", &config.image_selector)?;
    for (name, selector) in &config.fields {
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "detail field names cannot be empty".to_string(),
            ));
        }
        validate_selector(name, selector)?;
    }
    Ok(())
}

/// Validates tiling settings
fn validate_enrichment_config(config: &EnrichmentConfig) -> Result<(), ConfigError> {
    if config.max_image_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_image_bytes must be > 0".to_string(),
        ));
    }

    if config.tile_width == 0 || config.tile_height == 0 {
        return Err(ConfigError::Validation(format!(
            "tile dimensions must be positive, got {}x{}",
            config.tile_width, config.tile_height
        )));
    }

    // Interior rows are tile_height + tile_overlap tall
    let tallest = config.tile_height.saturating_add(config.tile_overlap);
    if config.tile_width > config.max_image_width || tallest > config.max_image_height {
        return Err(ConfigError::Validation(format!(
            "tiles up to {}x{} exceed the image ceiling {}x{}",
            config.tile_width, tallest, config.max_image_width, config.max_image_height
        )));
    }

    // Keeps the overlap below the row stride of any plan
    if config.tile_overlap.saturating_mul(2) >= config.tile_height {
        return Err(ConfigError::Validation(format!(
            "tile_overlap ({}) must be less than half of tile_height ({})",
            config.tile_overlap, config.tile_height
        )));
    }

    if config.ocr_concurrency < 1 || config.ocr_concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "ocr_concurrency must be between 1 and 32, got {}",
            config.ocr_concurrency
        )));
    }

    Ok(())
}

/// Validates backoff bounds
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "initial_backoff_ms ({}) must not exceed max_backoff_ms ({})",
            config.initial_backoff_ms, config.max_backoff_ms
        )));
    }
    Ok(())
}

/// Validates batch scheduling settings
fn validate_scoring_config(config: &ScoringConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if let Some(path) = &config.profile_path {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "profile_path cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates external service endpoints
fn validate_services_config(config: &ServicesConfig) -> Result<(), ConfigError> {
    for (name, endpoint) in [
        ("ocr_endpoint", &config.ocr_endpoint),
        ("rewrite_endpoint", &config.rewrite_endpoint),
        ("scorer_endpoint", &config.scorer_endpoint),
    ] {
        Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;
    }

    if let Some(var) = &config.api_key_env {
        if var.is_empty() {
            return Err(ConfigError::Validation(
                "api_key_env cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    // Validate contact URL
    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    // Validate contact email (basic validation)
    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a CSS selector parses
fn validate_selector(name: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|e| {
        ConfigError::Validation(format!("Invalid CSS selector for {}: {:?}", name, e))
    })?;
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
