//! Integration tests for the forum backend.

use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let pool = init_database(&db_path).await.expect("Failed to init DB");

        let config = Config {
            api_psk: psk.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
        };

        let app = create_router(AppState::with_repository(Repository::new(pool), config));

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the acting user to a request.
    fn as_user(&self, builder: RequestBuilder, user_id: &str) -> RequestBuilder {
        builder.header("x-user-id", user_id)
    }

    async fn create_user(&self, username: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/users"))
            .json(&json!({ "username": username, "displayName": username }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    async fn create_post(&self, user_id: &str, title: &str, tags: Value) -> Value {
        let resp = self
            .as_user(self.client.post(self.url("/api/posts")), user_id)
            .json(&json!({
                "title": title,
                "content": "C",
                "category": "general",
                "tags": tags
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    async fn reply(&self, user_id: &str, thread_id: &str, content: &str) -> reqwest::Response {
        self.as_user(
            self.client
                .post(self.url(&format!("/api/threads/{}/replies", thread_id))),
            user_id,
        )
        .json(&json!({ "content": content }))
        .send()
        .await
        .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).send().await.unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture.get("/health").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    // A plain client carries no API key
    let resp = Client::new()
        .get(fixture.url("/api/threads"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["error"], "Missing API key");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/threads"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_auth_disabled_without_psk() {
    let fixture = TestFixture::with_psk(None).await;

    let resp = fixture.get("/api/threads").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_post_and_reply_scenario() {
    let fixture = TestFixture::new().await;
    let alice = fixture.create_user("alice").await;

    let post = fixture
        .create_post(&alice, "T", json!([{ "name": "x" }]))
        .await;
    let post_id = post["id"].as_str().unwrap();
    assert_eq!(post["title"], "T");
    assert_eq!(post["content"], "C");
    assert_eq!(post["category"], "general");
    assert_eq!(post["replyToId"], Value::Null);
    assert_eq!(post["likeCount"], 0);
    assert_eq!(post["deleted"], false);
    assert_eq!(post["tags"][0]["name"], "x");

    let resp = fixture.reply(&alice, post_id, "R").await;
    assert_eq!(resp.status(), 200);
    let reply: Value = resp.json().await.unwrap();
    assert_eq!(reply["content"], "R");
    assert_eq!(reply["category"], "general");
    assert_eq!(reply["replyToId"], post_id);
    assert_eq!(reply["tags"][0]["name"], "x");
    assert_eq!(reply["author"]["username"], "alice");
    assert_eq!(reply["author"]["profile"]["displayName"], "alice");
    assert_eq!(reply["replies"], json!([]));

    // The post now lists the reply.
    let detail: Value = fixture
        .get(&format!("/api/threads/{}", post_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["replies"][0]["id"], reply["id"]);
    assert_eq!(detail["replies"][0]["author"]["username"], "alice");

    let replies: Value = fixture
        .get(&format!("/api/threads/{}/replies", post_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(replies.as_array().unwrap().len(), 1);
    assert!(replies[0].get("author").is_none());

    let posts: Value = fixture.get("/api/posts").await.json().await.unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 1);
    let threads: Value = fixture.get("/api/threads").await.json().await.unwrap();
    assert_eq!(threads.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_reply_to_missing_thread() {
    let fixture = TestFixture::new().await;
    let alice = fixture.create_user("alice").await;

    let resp = fixture.reply(&alice, "no-such-thread", "R").await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["error"], "Thread [no-such-thread] not found to reply to");

    let threads: Value = fixture.get("/api/threads").await.json().await.unwrap();
    assert_eq!(threads, json!([]));
}

#[tokio::test]
async fn test_like_and_unlike() {
    let fixture = TestFixture::new().await;
    let alice = fixture.create_user("alice").await;
    let bob = fixture.create_user("bob").await;
    let post = fixture.create_post(&alice, "T", json!([])).await;
    let like_path = format!("/api/threads/{}/like", post["id"].as_str().unwrap());

    let resp = fixture
        .as_user(fixture.client.post(fixture.url(&like_path)), &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let liked: Value = resp.json().await.unwrap();
    assert_eq!(liked["likeCount"], 1);

    let resp = fixture
        .as_user(fixture.client.post(fixture.url(&like_path)), &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "ALREADY_LIKED");

    let resp = fixture
        .as_user(fixture.client.delete(fixture.url(&like_path)), &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let unliked: Value = resp.json().await.unwrap();
    assert_eq!(unliked["likeCount"], 0);

    let resp = fixture
        .as_user(fixture.client.delete(fixture.url(&like_path)), &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "NOT_LIKED");

    // Liking without a user is rejected before reaching the store.
    let resp = fixture
        .client
        .post(fixture.url(&like_path))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_delete_state_machine() {
    let fixture = TestFixture::new().await;
    let alice = fixture.create_user("alice").await;
    let post = fixture.create_post(&alice, "T", json!([])).await;
    let post_id = post["id"].as_str().unwrap();

    let reply: Value = fixture.reply(&alice, post_id, "R").await.json().await.unwrap();
    let reply_id = reply["id"].as_str().unwrap();
    let nested: Value = fixture.reply(&alice, reply_id, "RR").await.json().await.unwrap();
    let nested_id = nested["id"].as_str().unwrap();

    // Reply with a reply: soft delete.
    let resp = fixture.delete(&format!("/api/replies/{}", reply_id)).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], true);
    let resp = fixture.get(&format!("/api/threads/{}", reply_id)).await;
    assert_eq!(resp.status(), 200);

    // Leaf reply: removed.
    let resp = fixture.delete(&format!("/api/threads/{}", nested_id)).await;
    assert_eq!(resp.status(), 200);
    let resp = fixture.get(&format!("/api/threads/{}", nested_id)).await;
    assert_eq!(resp.status(), 404);

    // Post: removed along with what is left below it.
    let resp = fixture.delete(&format!("/api/threads/{}", post_id)).await;
    assert_eq!(resp.status(), 200);
    let resp = fixture.get(&format!("/api/threads/{}", post_id)).await;
    assert_eq!(resp.status(), 404);
    let resp = fixture.get(&format!("/api/threads/{}", reply_id)).await;
    assert_eq!(resp.status(), 404);

    let resp = fixture.delete(&format!("/api/threads/{}", post_id)).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_recent_posts() {
    let fixture = TestFixture::new().await;
    let alice = fixture.create_user("alice").await;
    let first = fixture.create_post(&alice, "first", json!([])).await;
    fixture.create_post(&alice, "second", json!([])).await;
    fixture.create_post(&alice, "third", json!([])).await;
    let resp = fixture
        .reply(&alice, first["id"].as_str().unwrap(), "reply")
        .await;
    assert_eq!(resp.status(), 200);

    let recent: Value = fixture.get("/api/threads/recent").await.json().await.unwrap();
    let recent = recent.as_array().unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0]["title"], "third");
    assert_eq!(recent[1]["title"], "second");
    assert_eq!(recent[0]["author"]["username"], "alice");
    assert_eq!(recent[0]["likedBy"], json!([]));
}

#[tokio::test]
async fn test_validation_errors() {
    let fixture = TestFixture::new().await;
    let alice = fixture.create_user("alice").await;

    let resp = fixture
        .as_user(fixture.client.post(fixture.url("/api/posts")), &alice)
        .json(&json!({ "title": " ", "content": "C", "category": "general" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"], "Title is required");

    let resp = fixture
        .client
        .post(fixture.url("/api/users"))
        .json(&json!({ "username": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Posting as an unknown user
    let resp = fixture
        .as_user(fixture.client.post(fixture.url("/api/posts")), "ghost")
        .json(&json!({ "title": "T", "content": "C", "category": "general" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_duplicate_username() {
    let fixture = TestFixture::new().await;
    fixture.create_user("alice").await;

    let resp = fixture
        .client
        .post(fixture.url("/api/users"))
        .json(&json!({ "username": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_project_and_idea_crud() {
    let fixture = TestFixture::new().await;
    let alice = fixture.create_user("alice").await;
    let bob = fixture.create_user("bob").await;

    // Create project
    let resp = fixture
        .client
        .post(fixture.url("/api/projects"))
        .json(&json!({ "title": "Garden", "description": "Shared plot", "ownerId": alice }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let project: Value = resp.json().await.unwrap();
    let project_id = project["id"].as_str().unwrap();
    assert_eq!(project["title"], "Garden");
    assert_eq!(project["collaborators"][0]["id"], alice.as_str());
    assert_eq!(project["ideas"], json!([]));

    // Add collaborator
    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/projects/{}/collaborators", project_id)))
        .json(&json!({ "userId": bob }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let project: Value = resp.json().await.unwrap();
    assert_eq!(project["collaborators"].as_array().unwrap().len(), 2);

    // Create idea
    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/projects/{}/ideas", project_id)))
        .json(&json!({ "title": "Compost", "content": "Start a heap" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let idea: Value = resp.json().await.unwrap();
    let idea_id = idea["id"].as_str().unwrap();
    assert_eq!(idea["projectId"], project_id);
    let idea_path = format!("/api/projects/{}/ideas/{}", project_id, idea_id);

    // Update idea
    let resp = fixture
        .client
        .put(fixture.url(&idea_path))
        .json(&json!({ "title": "Big compost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["title"], "Big compost");
    assert_eq!(updated["content"], "Start a heap");

    // Get idea and project
    let fetched: Value = fixture.get(&idea_path).await.json().await.unwrap();
    assert_eq!(fetched["title"], "Big compost");

    // An explicit null clears the content
    let resp = fixture
        .client
        .put(fixture.url(&idea_path))
        .json(&json!({ "content": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let cleared: Value = resp.json().await.unwrap();
    assert_eq!(cleared["title"], "Big compost");
    assert!(cleared.get("content").is_none());
    let project: Value = fixture
        .get(&format!("/api/projects/{}", project_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(project["ideas"][0]["id"], idea_id);

    let projects: Value = fixture.get("/api/projects").await.json().await.unwrap();
    assert_eq!(projects.as_array().unwrap().len(), 1);

    // Delete idea
    let resp = fixture.delete(&idea_path).await;
    assert_eq!(resp.status(), 200);
    let resp = fixture.get(&idea_path).await;
    assert_eq!(resp.status(), 404);

    // Delete project
    let resp = fixture
        .delete(&format!("/api/projects/{}", project_id))
        .await;
    assert_eq!(resp.status(), 200);
    let deleted: Value = resp.json().await.unwrap();
    assert_eq!(deleted["title"], "Garden");
    let resp = fixture.get(&format!("/api/projects/{}", project_id)).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_bookmarked_ideas() {
    let fixture = TestFixture::new().await;
    let alice = fixture.create_user("alice").await;

    let project: Value = fixture
        .client
        .post(fixture.url("/api/projects"))
        .json(&json!({ "title": "P", "ownerId": alice }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let project_id = project["id"].as_str().unwrap();
    let idea: Value = fixture
        .client
        .post(fixture.url(&format!("/api/projects/{}/ideas", project_id)))
        .json(&json!({ "title": "Idea" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let bookmark_path = format!(
        "/api/projects/{}/ideas/{}/bookmark",
        project_id,
        idea["id"].as_str().unwrap()
    );

    let resp = fixture
        .as_user(fixture.client.post(fixture.url(&bookmark_path)), &alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .as_user(fixture.client.get(fixture.url("/api/ideas/bookmarked")), &alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let marked: Value = resp.json().await.unwrap();
    assert_eq!(marked[0]["title"], "Idea");

    let resp = fixture
        .as_user(fixture.client.delete(fixture.url(&bookmark_path)), &alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let marked: Value = fixture
        .as_user(fixture.client.get(fixture.url("/api/ideas/bookmarked")), &alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(marked, json!([]));

    // No user attached
    let resp = fixture.get("/api/ideas/bookmarked").await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_not_found_errors() {
    let fixture = TestFixture::new().await;

    for path in [
        "/api/threads/missing",
        "/api/projects/missing",
        "/api/projects/missing/ideas/missing",
        "/api/users/missing",
    ] {
        let resp = fixture.get(path).await;
        assert_eq!(resp.status(), 404, "{}", path);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/users"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "BAD_REQUEST");

    // Well-formed JSON missing a required field
    let resp = fixture
        .client
        .post(fixture.url("/api/projects"))
        .json(&json!({ "description": "no title" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "BAD_REQUEST");
}
