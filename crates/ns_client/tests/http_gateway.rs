use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use ns_client::{ClientConfig, HttpGateway, Session, SessionState};
use ns_core::{ArticleQuery, Credentials, Error, NewsApi, Sentiment, TopicRequest};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api/v1", addr)
}

fn gateway(base: &str, session: Session) -> HttpGateway {
    HttpGateway::new(ClientConfig::new(base).unwrap(), session).unwrap()
}

fn topic_json(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "keywords": ["a", "b"],
        "sourceIds": null,
        "globalSearch": true,
        "language": "en",
        "searchIntervalMinutes": 60,
        "lastSearchedAt": null,
        "createdAt": "2024-03-01T00:00:00Z"
    })
}

#[tokio::test]
async fn test_articles_carry_bearer_and_filters() {
    let seen: Arc<Mutex<Vec<(Option<String>, HashMap<String, String>)>>> = Arc::default();
    let recorder = seen.clone();
    let router = Router::new().route(
        "/api/v1/articles",
        get(move |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| {
            let recorder = recorder.clone();
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                recorder.lock().unwrap().push((auth, params));
                Json(json!({
                    "content": [{
                        "id": 1,
                        "sourceId": 3,
                        "sourceName": "CivilNet",
                        "title": "Protest",
                        "url": "https://civilnet.am/1",
                        "publishedAt": "2024-03-01T10:00:00Z",
                        "sentiment": "NEGATIVE",
                        "confidence": 0.91
                    }],
                    "totalElements": 21,
                    "totalPages": 2,
                    "size": 20,
                    "number": 1
                }))
            }
        }),
    );
    let base = serve(router).await;
    let api = gateway(&base, Session::with_token("abc", 3600));

    let page = api
        .list_articles(&ArticleQuery {
            source_id: Some(3),
            sentiment: Some(Sentiment::Negative),
            page: 1,
            ..ArticleQuery::default()
        })
        .await
        .unwrap();

    assert_eq!(page.page, 1);
    assert!(page.is_last());
    assert_eq!(page.content[0].sentiment, Some(Sentiment::Negative));

    let seen = seen.lock().unwrap();
    let (auth, params) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer abc"));
    assert_eq!(params.get("sourceId").map(String::as_str), Some("3"));
    assert_eq!(params.get("sentiment").map(String::as_str), Some("NEGATIVE"));
    assert_eq!(params.get("page").map(String::as_str), Some("1"));
    assert_eq!(params.get("size").map(String::as_str), Some("20"));
    assert!(!params.contains_key("from"));
    assert!(!params.contains_key("q"));
}

#[tokio::test]
async fn test_unauthorized_tears_down_session() {
    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
    let recorder = seen.clone();
    let router = Router::new().route(
        "/api/v1/topics",
        get(move |headers: HeaderMap| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push(
                    headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                );
                StatusCode::UNAUTHORIZED
            }
        }),
    );
    let base = serve(router).await;
    let session = Session::with_token("stale", 3600);
    let mut events = session.subscribe();
    let api = gateway(&base, session.clone());

    assert_eq!(api.list_topics().await, Err(Error::Unauthorized));
    events.changed().await.unwrap();
    assert_eq!(*events.borrow(), SessionState::Expired);
    assert!(!session.is_authenticated());

    // the next request goes out without a token
    assert_eq!(api.list_topics().await, Err(Error::Unauthorized));
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].as_deref(), Some("Bearer stale"));
    assert_eq!(seen[1], None);
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let router = Router::new()
        .route(
            "/api/v1/articles/:id",
            get(|Path(id): Path<i64>| async move {
                if id == 404 {
                    (StatusCode::NOT_FOUND, String::new())
                } else {
                    (StatusCode::SERVICE_UNAVAILABLE, "maintenance".to_string())
                }
            }),
        )
        .route(
            "/api/v1/sources/:id",
            get(|| async { "definitely not json" }),
        );
    let base = serve(router).await;
    let api = gateway(&base, Session::with_token("abc", 3600));

    assert_eq!(
        api.get_article(404).await,
        Err(Error::NotFound("/api/v1/articles/404".to_string()))
    );
    assert_eq!(
        api.get_article(1).await,
        Err(Error::Server { status: 503, message: "maintenance".to_string() })
    );
    assert!(matches!(api.get_source(1).await, Err(Error::Decode(_))));
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = gateway(&format!("http://{}/api/v1", addr), Session::new());
    let err = api.list_topics().await.unwrap_err();
    assert!(matches!(err, Error::Network(_)), "{:?}", err);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_hung_request_times_out() {
    let router = Router::new().route(
        "/api/v1/topics",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!([]))
        }),
    );
    let base = serve(router).await;
    let config = ClientConfig::new(&base)
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let api = HttpGateway::new(config, Session::with_token("abc", 3600)).unwrap();

    let err = api.list_topics().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{:?}", err);
}

#[tokio::test]
async fn test_topic_mutations() {
    let bodies: Arc<Mutex<Vec<Value>>> = Arc::default();
    let recorder = bodies.clone();
    let router = Router::new()
        .route(
            "/api/v1/topics",
            post(move |Json(body): Json<Value>| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push(body);
                    Json(topic_json(9, "Tech"))
                }
            }),
        )
        .route(
            "/api/v1/topics/:id",
            delete(|Path(id): Path<i64>| async move {
                if id == 9 {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::NOT_FOUND
                }
            }),
        );
    let base = serve(router).await;
    let api = gateway(&base, Session::with_token("abc", 3600));

    let topic = api
        .create_topic(&TopicRequest {
            name: "Tech".to_string(),
            keywords: vec!["a".to_string(), "b".to_string()],
            source_ids: None,
            global_search: Some(true),
            language: Some("en".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(topic.id, 9);
    assert!(topic.global_search);
    assert_eq!(
        bodies.lock().unwrap()[0],
        json!({"name": "Tech", "keywords": ["a", "b"], "globalSearch": true, "language": "en"})
    );

    assert_eq!(api.delete_topic(9).await, Ok(()));
    assert!(matches!(api.delete_topic(10).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_login_returns_token() {
    let router = Router::new().route(
        "/api/v1/auth/login",
        post(|Json(body): Json<Value>| async move {
            if body["password"] == "demo" {
                (StatusCode::OK, Json(json!({"token": "t-1", "expiresIn": 3600})))
            } else {
                (StatusCode::UNAUTHORIZED, Json(json!({})))
            }
        }),
    );
    let base = serve(router).await;
    let session = Session::new();
    let api = gateway(&base, session.clone());

    let token = api
        .login(&Credentials { email: "a@b.c".into(), password: "demo".into() })
        .await
        .unwrap();
    assert_eq!(token.token, "t-1");
    assert_eq!(token.expires_in, 3600);
    // issuing a token does not start the session by itself
    assert!(!session.is_authenticated());
}
