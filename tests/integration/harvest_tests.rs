//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a listing site and the external
//! services, and run complete harvest cycles against a database on disk.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use sumi_harvest::config::{
    Config, DetailConfig, EnrichmentConfig, ListingConfig, OutputConfig, RetryConfig,
    ScoringConfig, ServicesConfig, UserAgentConfig,
};
use sumi_harvest::crawler::{run_harvest, RunOptions};
use sumi_harvest::storage::{EnrichmentSource, RunStatus, SqliteStorage, Storage};
use sumi_harvest::StopReason;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Listing pages `1..=full_pages` carry `per_page` links each; later pages are empty
struct ListingPages {
    full_pages: u32,
    per_page: u32,
}

impl Respond for ListingPages {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let page: u32 = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);

        let links = if (1..=self.full_pages).contains(&page) {
            let first = (page - 1) * self.per_page;
            (first..first + self.per_page)
                .map(|id| format!("<li><a class=\"job\" href=\"/job/{}\">Job {}</a></li>", id, id))
                .collect::<String>()
        } else {
            String::new()
        };

        ResponseTemplate::new(200)
            .set_body_string(format!("<html><body><ul>{}</ul></body></html>", links))
            .insert_header("content-type", "text/html")
    }
}

/// Detail pages; job 0 embeds an image
struct DetailPages;

impl Respond for DetailPages {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = request.url.path().rsplit('/').next().unwrap_or_default();
        let image = if id == "0" {
            r#"<img src="/img/0.png">"#
        } else {
            ""
        };

        ResponseTemplate::new(200)
            .set_body_string(format!(
                r#"<html><head><title>Job {id}</title></head><body>
                <h1>Rust Engineer {id}</h1>
                <span class="company">Acme</span>
                <div class="description"><p>Build things in Rust.</p>{image}</div>
                </body></html>"#
            ))
            .insert_header("content-type", "text/html")
    }
}

/// Scores every submitted record; even IDs are recommended
struct EvenScorer;

impl Respond for EvenScorer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let results: Vec<serde_json::Value> = body["records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|record| {
                let id = record["id"].as_i64().unwrap();
                serde_json::json!({
                    "id": id,
                    "score": if id % 2 == 0 { 85.0 } else { 40.0 },
                    "reason": "profile overlap",
                    "recommend": id % 2 == 0,
                })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "results": results }))
    }
}

fn png_bytes() -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(40, 30));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Mounts the listing, detail pages, the image and all three services
async fn mount_site(server: &MockServer, full_pages: u32, per_page: u32) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ListingPages {
            full_pages,
            per_page,
        })
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/job/\d+$"))
        .respond_with(DetailPages)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/0.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes())
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "Salary: 100k" })),
        )
        .mount(server)
        .await;

    // Rejections are not retried; the cleaned text is kept
    Mock::given(method("POST"))
        .and(path("/rewrite"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unsupported"))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/score"))
        .respond_with(EvenScorer)
        .mount(server)
        .await;
}

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &Path, profile_path: Option<&Path>) -> Config {
    let mut fields = BTreeMap::new();
    fields.insert("company".to_string(), "span.company".to_string());

    Config {
        listing: ListingConfig {
            url_template: format!("{}/list?page={{page}}", base_url),
            start_page: 1,
            end_page: 20,
            link_selector: "a.job".to_string(),
            wait_selector: Some("ul".to_string()),
            empty_threshold: 3,
            duplicate_threshold: 3,
            min_sample: 5,
            page_timeout_ms: 5_000,
            page_delay_ms: 0,
        },
        detail: DetailConfig {
            title_selector: "h1".to_string(),
            body_selector: "div.description".to_string(),
            image_selector: "img[src]".to_string(),
            fields,
            retries: 2,
            retry_delay_ms: 10,
            timeout_ms: 5_000,
        },
        enrichment: EnrichmentConfig::default(),
        retry: RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 10,
            max_backoff_ms: 20,
        },
        scoring: ScoringConfig {
            enabled: true,
            batch_size: 8,
            cooldown_ms: 10,
            profile_path: profile_path.map(|p| p.to_string_lossy().to_string()),
        },
        services: ServicesConfig {
            ocr_endpoint: format!("{}/ocr", base_url),
            rewrite_endpoint: format!("{}/rewrite", base_url),
            scorer_endpoint: format!("{}/score", base_url),
            api_key_env: None,
            timeout_ms: 5_000,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string_lossy().to_string(),
        },
    }
}

fn profile_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Senior Rust engineer, remote").unwrap();
    file
}

#[tokio::test]
async fn test_full_harvest_run() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 10).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let profile = profile_file();
    let config = create_test_config(&server.uri(), &db_path, Some(profile.path()));

    let summary = run_harvest(
        config,
        "test-hash".to_string(),
        RunOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.pages_walked, 5);
    assert_eq!(summary.stop_reason, Some(StopReason::ExhaustedEmpty));
    assert_eq!(summary.candidates, 20);
    assert_eq!(summary.harvested, 20);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.rescored, 20);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_total_records().unwrap(), 20);
    assert_eq!(storage.count_unmatched().unwrap(), 0);
    assert_eq!(storage.count_recommended().unwrap(), 10);
    assert_eq!(
        storage
            .count_by_enrichment(EnrichmentSource::OcrAugmented)
            .unwrap(),
        1
    );

    let records = storage.get_recent(20).unwrap();
    let with_image = records
        .iter()
        .find(|r| r.url == format!("{}/job/0", server.uri()))
        .unwrap();
    assert_eq!(with_image.title.as_deref(), Some("Rust Engineer 0"));
    assert_eq!(
        with_image.fields.get("company").map(String::as_str),
        Some("Acme")
    );
    assert_eq!(with_image.raw_text, "Build things in Rust.");
    assert!(with_image.body_text.contains("Build things in Rust."));
    assert!(with_image.body_text.contains("Salary: 100k"));
    assert!(!with_image.rewritten);
    assert!(with_image.checked);
    assert!(with_image.assessment.is_some());

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.id, summary.run_id);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.stop_reason.as_deref(), Some("exhausted-empty"));
    assert_eq!(run.harvested, 20);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_rerun_stops_on_known_pages_without_refetching() {
    let server = MockServer::start().await;
    mount_site(&server, 4, 10).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let options = RunOptions {
        harvest: true,
        rescore: false,
    };

    let first = run_harvest(
        create_test_config(&server.uri(), &db_path, None),
        "hash".to_string(),
        options,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(first.harvested, 40);
    assert_eq!(first.stop_reason, Some(StopReason::ExhaustedEmpty));

    let second = run_harvest(
        create_test_config(&server.uri(), &db_path, None),
        "hash".to_string(),
        options,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(second.stop_reason, Some(StopReason::ExhaustedDuplicate));
    assert_eq!(second.pages_walked, 3);
    assert_eq!(second.harvested, 0);
    assert_eq!(second.skipped_existing, 30);

    // Each detail page is fetched exactly once across both runs
    let detail_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/job/"))
        .count();
    assert_eq!(detail_requests, 40);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_total_records().unwrap(), 40);
    assert_eq!(storage.count_unmatched().unwrap(), 40);
}

#[tokio::test]
async fn test_rescore_only_run() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 10).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let profile = profile_file();

    let harvested = run_harvest(
        create_test_config(&server.uri(), &db_path, Some(profile.path())),
        "hash".to_string(),
        RunOptions {
            harvest: true,
            rescore: false,
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(harvested.harvested, 20);
    assert_eq!(harvested.rescored, 0);

    let rescored = run_harvest(
        create_test_config(&server.uri(), &db_path, Some(profile.path())),
        "hash".to_string(),
        RunOptions {
            harvest: false,
            rescore: true,
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(rescored.pages_walked, 0);
    assert_eq!(rescored.stop_reason, None);
    assert_eq!(rescored.rescored, 20);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_unmatched().unwrap(), 0);
    assert_eq!(storage.count_recommended().unwrap(), 10);
}
