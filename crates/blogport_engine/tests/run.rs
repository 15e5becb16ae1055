use std::fs;
use std::path::Path;

use blogport_core::{Document, RunConfig};
use blogport_engine::{MigrateError, RunController};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// 2021-06-15T00:00:00Z
const CREATED_AT: i64 = 1_623_715_200_000;

fn mobiledoc_with(cards: Value) -> String {
    json!({
        "version": "0.3.1",
        "atoms": [],
        "markups": [],
        "sections": [],
        "cards": cards
    })
    .to_string()
}

fn image_card(src: &str) -> Value {
    json!(["image", {"src": src, "width": 800}])
}

fn post_json(slug: &str, mobiledoc: &str) -> Value {
    json!({"slug": slug, "created_at": CREATED_AT, "mobiledoc": mobiledoc})
}

fn document_of(posts: Vec<Value>) -> Document {
    serde_json::from_value(json!({"data": {"posts": posts}})).unwrap()
}

fn test_config(output_dir: &Path) -> RunConfig {
    RunConfig {
        max_qps: 1000.0,
        output_dir: output_dir.to_path_buf(),
        ..RunConfig::default()
    }
}

async fn mount_image(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Content-Length", body.len().to_string()),
        )
        .mount(server)
        .await;
}

async fn get_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.to_string().eq_ignore_ascii_case("GET"))
        .count()
}

fn cards_of(post_mobiledoc: &str) -> Vec<Value> {
    let parsed: Value = serde_json::from_str(post_mobiledoc).unwrap();
    parsed["cards"].as_array().unwrap().clone()
}

#[tokio::test]
async fn localizes_images_and_promotes_the_first_as_feature() {
    port_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_image(&server, "/photo.png", b"first-image").await;
    mount_image(&server, "/second.png", b"second-image-bytes").await;

    let temp = TempDir::new().unwrap();
    let mobiledoc = mobiledoc_with(json!([
        ["markdown", {"markdown": "# Hello"}],
        image_card(&format!("{}/photo.png", server.uri())),
        image_card(&format!("{}/second.png", server.uri())),
    ]));
    let mut document = document_of(vec![post_json("my-post", &mobiledoc)]);

    let controller = RunController::new(test_config(temp.path()));
    let stats = controller.run(&mut document).await.unwrap();

    assert_eq!(stats.posts_processed, 1);
    assert_eq!(stats.images_fetched, 2);

    let post = &document.data.posts[0];
    let cards = cards_of(&post.mobiledoc);
    assert_eq!(cards.len(), 3);
    let expected_src = "__GHOST_URL__/content/images/2021/06/my-post/photo.png";
    assert_eq!(cards[1][1]["src"], expected_src);
    // Payload fields other than src survive the rewrite.
    assert_eq!(cards[1][1]["width"], 800);
    assert_eq!(post.feature_image.as_deref(), Some(expected_src));

    // Files land under root/YYYY/MM/slug with the remote's byte length.
    let on_disk = temp.path().join("2021/06/my-post/photo.png");
    assert_eq!(fs::read(&on_disk).unwrap(), b"first-image");
    let second = temp.path().join("2021/06/my-post/second.png");
    assert_eq!(fs::read(&second).unwrap().len(), b"second-image-bytes".len());
}

#[tokio::test]
async fn remove_mode_drops_exactly_the_promoted_card() {
    let server = MockServer::start().await;
    mount_image(&server, "/photo.png", b"first-image").await;
    mount_image(&server, "/second.png", b"second-image").await;

    let temp = TempDir::new().unwrap();
    let mobiledoc = mobiledoc_with(json!([
        ["markdown", {"markdown": "text"}],
        image_card(&format!("{}/photo.png", server.uri())),
        image_card(&format!("{}/second.png", server.uri())),
    ]));
    let mut document = document_of(vec![post_json("my-post", &mobiledoc)]);

    let config = RunConfig {
        duplicate_feature_img: false,
        ..test_config(temp.path())
    };
    RunController::new(config).run(&mut document).await.unwrap();

    let post = &document.data.posts[0];
    let cards = cards_of(&post.mobiledoc);
    // List shrank by exactly one; the first image card is gone, the later
    // one stays.
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0][0], "markdown");
    assert_eq!(
        cards[1][1]["src"],
        "__GHOST_URL__/content/images/2021/06/my-post/second.png"
    );
    assert_eq!(
        post.feature_image.as_deref(),
        Some("__GHOST_URL__/content/images/2021/06/my-post/photo.png")
    );
}

#[tokio::test]
async fn posts_without_images_get_no_feature_image() {
    let temp = TempDir::new().unwrap();
    let mobiledoc = mobiledoc_with(json!([["markdown", {"markdown": "only text"}]]));
    let mut document = document_of(vec![post_json("plain-post", &mobiledoc)]);

    let stats = RunController::new(test_config(temp.path()))
        .run(&mut document)
        .await
        .unwrap();

    assert_eq!(stats.images_fetched, 0);
    let post = &document.data.posts[0];
    assert_eq!(post.feature_image, None);
    assert_eq!(post.mobiledoc, mobiledoc);
}

#[tokio::test]
async fn second_run_issues_no_gets_and_produces_identical_output() {
    let server = MockServer::start().await;
    mount_image(&server, "/photo.png", b"stable-bytes").await;

    let temp = TempDir::new().unwrap();
    let mobiledoc = mobiledoc_with(json!([
        image_card(&format!("{}/photo.png", server.uri()))
    ]));
    let input = document_of(vec![post_json("my-post", &mobiledoc)]);

    let controller = RunController::new(test_config(temp.path()));

    let mut first = input.clone();
    controller.run(&mut first).await.unwrap();
    assert_eq!(get_count(&server).await, 1);

    let mut second = input.clone();
    let stats = controller.run(&mut second).await.unwrap();

    // Cache hit: one HEAD, zero further GETs.
    assert_eq!(get_count(&server).await, 1);
    assert_eq!(stats.images_verified, 1);
    assert_eq!(stats.images_fetched, 0);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn skip_until_gates_earlier_posts_untouched() {
    let server = MockServer::start().await;
    mount_image(&server, "/a.png", b"aaa").await;
    mount_image(&server, "/b.png", b"bbb").await;
    mount_image(&server, "/c.png", b"ccc").await;

    let temp = TempDir::new().unwrap();
    let doc_a = mobiledoc_with(json!([image_card(&format!("{}/a.png", server.uri()))]));
    let doc_b = mobiledoc_with(json!([image_card(&format!("{}/b.png", server.uri()))]));
    let doc_c = mobiledoc_with(json!([image_card(&format!("{}/c.png", server.uri()))]));
    let mut document = document_of(vec![
        post_json("post-a", &doc_a),
        post_json("post-b", &doc_b),
        post_json("post-c", &doc_c),
    ]);

    let config = RunConfig {
        skip_until: Some("post-b".to_string()),
        ..test_config(temp.path())
    };
    let stats = RunController::new(config).run(&mut document).await.unwrap();

    assert_eq!(stats.posts_gated, 1);
    assert_eq!(stats.posts_processed, 2);

    // Post A: cards and URLs untouched, no file fetched.
    assert_eq!(document.data.posts[0].mobiledoc, doc_a);
    assert_eq!(document.data.posts[0].feature_image, None);
    assert!(!temp.path().join("2021/06/post-a/a.png").exists());

    // Posts B and C: fully localized.
    for (index, slug, file) in [(1, "post-b", "b.png"), (2, "post-c", "c.png")] {
        let post = &document.data.posts[index];
        let expected = format!("__GHOST_URL__/content/images/2021/06/{slug}/{file}");
        assert_eq!(post.feature_image.as_deref(), Some(expected.as_str()));
        assert!(temp.path().join(format!("2021/06/{slug}/{file}")).exists());
    }
}

#[tokio::test]
async fn unmatched_skip_until_processes_nothing() {
    let temp = TempDir::new().unwrap();
    let mobiledoc = mobiledoc_with(json!([["markdown", {"markdown": "text"}]]));
    let mut document = document_of(vec![post_json("only-post", &mobiledoc)]);

    let config = RunConfig {
        skip_until: Some("no-such-slug".to_string()),
        ..test_config(temp.path())
    };
    let stats = RunController::new(config).run(&mut document).await.unwrap();

    assert_eq!(stats.posts_processed, 0);
    assert_eq!(stats.posts_gated, 1);
    assert_eq!(document.data.posts[0].mobiledoc, mobiledoc);
}

#[tokio::test]
async fn collision_aborts_but_keeps_earlier_rewrites() {
    let server = MockServer::start().await;
    mount_image(&server, "/first.png", b"first-ok").await;
    mount_image(&server, "/clash.png", b"remote-is-nine").await;

    let temp = TempDir::new().unwrap();
    // A stale cached copy with a different non-zero size.
    let clash_local = temp.path().join("2021/06/my-post/clash.png");
    fs::create_dir_all(clash_local.parent().unwrap()).unwrap();
    fs::write(&clash_local, b"xx").unwrap();

    let first_src = format!("{}/first.png", server.uri());
    let clash_src = format!("{}/clash.png", server.uri());
    let mobiledoc = mobiledoc_with(json!([
        image_card(&first_src),
        image_card(&clash_src),
    ]));
    let mut document = document_of(vec![post_json("my-post", &mobiledoc)]);

    let err = RunController::new(test_config(temp.path()))
        .run(&mut document)
        .await
        .unwrap_err();

    match err {
        MigrateError::CacheCollision {
            slug,
            local_len,
            remote_len,
            ..
        } => {
            assert_eq!(slug, "my-post");
            assert_eq!(local_len, 2);
            assert_eq!(remote_len, b"remote-is-nine".len() as u64);
        }
        other => panic!("expected a cache collision, got {other}"),
    }

    // The image processed before the collision stays rewritten and on disk.
    let cards = cards_of(&document.data.posts[0].mobiledoc);
    assert_eq!(
        cards[0][1]["src"],
        "__GHOST_URL__/content/images/2021/06/my-post/first.png"
    );
    assert_eq!(cards[1][1]["src"], clash_src);
    assert!(temp.path().join("2021/06/my-post/first.png").exists());
    // The colliding file was not overwritten.
    assert_eq!(fs::read(&clash_local).unwrap(), b"xx");
}

#[tokio::test]
async fn encoded_traversal_in_image_source_is_fatal() {
    let temp = TempDir::new().unwrap();
    // Percent-encoded separators decode to "../../evil.png"; that must
    // never become a path under the image root.
    let src = "https://img.example.test/%2e%2e%2f%2e%2e%2fevil.png";
    let mobiledoc = mobiledoc_with(json!([["image", {"src": src}]]));
    let mut document = document_of(vec![post_json("sneaky-post", &mobiledoc)]);

    let err = RunController::new(test_config(temp.path()))
        .run(&mut document)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrateError::MalformedReference { slug, src: bad }
            if slug == "sneaky-post" && bad == src
    ));
    // Rejected before any fetch or write; the image root stays empty.
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn unparsable_image_source_is_fatal_for_the_post() {
    let temp = TempDir::new().unwrap();
    let mobiledoc = mobiledoc_with(json!([["image", {"src": "not a url"}]]));
    let mut document = document_of(vec![post_json("bad-post", &mobiledoc)]);

    let err = RunController::new(test_config(temp.path()))
        .run(&mut document)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrateError::MalformedReference { slug, src }
            if slug == "bad-post" && src == "not a url"
    ));
}
