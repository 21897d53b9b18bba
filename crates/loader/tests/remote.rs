use grimoire_loader::{LoaderError, RemoteLoader, SourceLoader};
use grimoire_state::RepositoryRef;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn loader(server: &MockServer, ttl: Duration, token: Option<&str>) -> RemoteLoader {
    let repo = RepositoryRef::parse("https://github.com/acme/prompts.git").unwrap();
    RemoteLoader::new(repo, "main", ttl, token.map(str::to_string))
        .unwrap()
        .with_endpoints(server.uri(), format!("{}/raw", server.uri()))
}

fn entry(name: &str, path: &str, kind: &str) -> serde_json::Value {
    json!({"name": name, "path": path, "type": kind, "sha": "abc", "size": 10})
}

async fn mount_listing(server: &MockServer, dir: &str, entries: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/acme/prompts/contents/{dir}")))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(server)
        .await;
}

async fn mount_raw(server: &MockServer, file: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/raw/acme/prompts/main/{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn loads_commands_recursively() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "commands",
        json!([
            entry("greet.yaml", "commands/greet.yaml", "file"),
            entry("README.txt", "commands/README.txt", "file"),
            entry("git", "commands/git", "dir"),
        ]),
    )
    .await;
    mount_listing(
        &server,
        "commands/git",
        json!([entry("commit.md", "commands/git/commit.md", "file")]),
    )
    .await;
    mount_raw(&server, "commands/greet.yaml", "name: greet\nprompt: Hello $NAME\n").await;
    mount_raw(&server, "commands/git/commit.md", "Purpose: Commit\nCommit $MESSAGE").await;

    let loaded = loader(&server, Duration::ZERO, None).load_commands().await.unwrap();
    let names: Vec<_> = loaded.items.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["commit", "greet"]);
    assert_eq!(loaded.items[1].argument_specs[0].name, "NAME");
}

#[tokio::test]
async fn missing_rules_file_is_empty_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let loader = loader(&server, Duration::ZERO, None);
    let rules = loader.load_rules().await.unwrap();
    assert!(rules.items.is_empty());
    let personas = loader.load_personas().await.unwrap();
    assert!(personas.items.is_empty());
}

#[tokio::test]
async fn rules_are_flattened_from_raw_file() {
    let server = MockServer::start().await;
    mount_raw(&server, "rules.yml", "rules:\n  - test first\ngit:\n  style: small commits\n").await;

    let rules = loader(&server, Duration::ZERO, None).load_rules().await.unwrap();
    let names: Vec<_> = rules.items.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["rules", "style"]);
}

#[tokio::test]
async fn server_errors_propagate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/prompts/contents/personas"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = loader(&server, Duration::ZERO, None)
        .load_personas()
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::Status { status: 500, .. }));
}

#[tokio::test]
async fn rate_limit_error_carries_hint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = loader(&server, Duration::ZERO, None)
        .load_commands()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("GITHUB_TOKEN"));
}

#[tokio::test]
async fn cached_paths_are_not_refetched_until_cleared() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/prompts/contents/personas"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([entry("bot.yaml", "personas/bot.yaml", "file")])),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/acme/prompts/main/personas/bot.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("name: Bot\ninstructions: Be helpful\n"))
        .expect(2)
        .mount(&server)
        .await;

    let loader = loader(&server, Duration::from_secs(300), None);
    for _ in 0..3 {
        let personas = loader.load_personas().await.unwrap();
        assert_eq!(personas.items[0].instructions, "Be helpful");
    }
    assert_eq!(loader.cached_entries(), 2);

    loader.clear_cache();
    assert_eq!(loader.cached_entries(), 0);
    loader.load_personas().await.unwrap();
}

#[tokio::test]
async fn token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/prompts/contents/commands"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let loaded = loader(&server, Duration::ZERO, Some("s3cret"))
        .load_commands()
        .await
        .unwrap();
    assert!(loaded.items.is_empty());
}
