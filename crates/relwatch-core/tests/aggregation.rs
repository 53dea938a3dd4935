// End to end: config -> real fetchers against mock upstreams -> merged list
use chrono::{Duration, TimeZone, Utc};
use relwatch_core::{Config, ReleaseAggregator, ReleaseContext};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, sources: &str) -> Config {
    Config::from_toml(&format!(
        r#"
        [endpoints]
        github_api = "{uri}"
        npm_registry = "{uri}"

        {sources}
        "#,
        uri = server.uri(),
        sources = sources
    ))
    .unwrap()
}

async fn mount_github_release(server: &MockServer, repo: &str, tag: &str, published: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{}/releases", repo)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "tag_name": tag,
            "name": format!("{} {}", repo, tag),
            "body": "- feat: something new\n- fix: something old",
            "draft": false,
            "published_at": published
        }])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_releases_from_all_sources_newest_first() {
    let server = MockServer::start().await;
    mount_github_release(&server, "nimiq/one", "v1", "2024-01-03T00:00:00Z").await;
    mount_github_release(&server, "nimiq/two", "v2", "2024-01-01T00:00:00Z").await;
    mount_github_release(&server, "nimiq/three", "v3", "2024-01-02T00:00:00Z").await;
    Mock::given(method("GET"))
        .and(path("/repos/nimiq/broken/releases"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        r#"
        [[sources]]
        label = "One"
        source = "gh:nimiq/one"

        [[sources]]
        label = "Two"
        source = "gh:nimiq/two"

        [[sources]]
        label = "Broken"
        source = "gh:nimiq/broken"

        [[sources]]
        label = "Three"
        source = "gh:nimiq/three"
        "#,
    );

    let releases = ReleaseAggregator::new(config)
        .list_releases(ReleaseContext::Releases, None)
        .await
        .unwrap();

    let dates: Vec<String> = releases
        .iter()
        .map(|r| r.date.format("%m-%d").to_string())
        .collect();
    assert_eq!(dates, vec!["01-03", "01-02", "01-01"]);

    let labels: Vec<&str> = releases
        .iter()
        .filter_map(|r| r.group_label.as_deref())
        .collect();
    assert_eq!(labels, vec!["One", "Three", "Two"]);
    assert_eq!(releases[0].url, "https://github.com/nimiq/one/releases/tag/v1");
}

#[tokio::test]
async fn test_merge_keeps_the_35_most_recent() {
    let server = MockServer::start().await;
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    // 4 packages x 10 versions, every version on its own day
    for (p, name) in ["pkg-a", "pkg-b", "pkg-c", "pkg-d"].iter().enumerate() {
        let mut versions = serde_json::Map::new();
        let mut time = serde_json::Map::new();
        for v in 0..10 {
            let version = format!("1.{}.0", v);
            let day = start + Duration::days((p * 10 + v) as i64);
            versions.insert(version.clone(), json!({ "version": version }));
            time.insert(version, json!(day.to_rfc3339()));
        }
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": name,
                "versions": versions,
                "time": time
            })))
            .mount(&server)
            .await;
    }

    let config = config_for(
        &server,
        r#"
        [[sources]]
        label = "Packages"
        source = { kind = "npm", config = { packages = ["pkg-a", "pkg-b", "pkg-c", "pkg-d"] } }
        "#,
    );

    let releases = ReleaseAggregator::new(config)
        .list_releases(ReleaseContext::Releases, None)
        .await
        .unwrap();

    assert_eq!(releases.len(), 35);
    assert_eq!(releases[0].title, "pkg-d@1.9.0");
    assert_eq!(releases[0].date, start + Duration::days(39));
    assert_eq!(releases[34].date, start + Duration::days(5));
    assert!(releases.windows(2).all(|w| w[0].date >= w[1].date));
}

#[tokio::test]
async fn test_disabled_and_hidden_groups() {
    let server = MockServer::start().await;
    mount_github_release(&server, "nimiq/public", "v1", "2024-01-03T00:00:00Z").await;
    mount_github_release(&server, "nimiq/quiet", "v1", "2024-01-02T00:00:00Z").await;
    Mock::given(method("GET"))
        .and(path("/repos/nimiq/disabled/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        r#"
        [[sources]]
        label = "Public"
        source = "gh:nimiq/public"

        [[sources]]
        label = "Quiet"
        showInSummary = false
        source = "gh:nimiq/quiet"

        [[sources]]
        label = "Disabled"
        source = { kind = "github", config = { enabled = false, repos = ["nimiq/disabled"] } }
        "#,
    );
    let aggregator = ReleaseAggregator::new(config);

    let releases = aggregator
        .list_releases(ReleaseContext::Releases, None)
        .await
        .unwrap();
    assert_eq!(releases.len(), 2);

    let summary = aggregator
        .list_releases(ReleaseContext::Summary, None)
        .await
        .unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].repo, "nimiq/public");
}

#[tokio::test]
async fn test_repo_filter_limits_upstream_calls() {
    let server = MockServer::start().await;
    mount_github_release(&server, "nimiq/wallet", "v1", "2024-01-03T00:00:00Z").await;
    Mock::given(method("GET"))
        .and(path("/repos/nimiq/hub/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        r#"
        [[sources]]
        label = "Wallet"
        source = "gh:nimiq/wallet"

        [[sources]]
        label = "Hub"
        source = "gh:nimiq/hub"
        "#,
    );

    let releases = ReleaseAggregator::new(config)
        .list_releases(ReleaseContext::Releases, Some("gh:wallet"))
        .await
        .unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].repo, "nimiq/wallet");
}
