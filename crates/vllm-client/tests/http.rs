//! End-to-end tests against an in-process HTTP server.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};

use vllm_client::{CancellationToken, ClientConfig, GenerationClient, GenerationRequest, SamplingParams};

/// Mimics the generate API: echoes `n` completions built from the prompt.
async fn generate(Json(body): Json<Value>) -> Response {
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    let n = body["n"].as_u64().unwrap_or(1) as usize;

    if prompt == "fail" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "engine crashed").into_response();
    }

    if body["stream"] == json!(true) {
        let words = ["Five", " fingers", "."];
        let mut frames = Vec::new();
        let mut text = prompt.clone();
        for word in words {
            text.push_str(word);
            let mut frame = serde_json::to_vec(&json!({ "text": vec![text.clone(); n] })).unwrap();
            frame.push(0);
            frames.push(Ok::<_, std::io::Error>(frame));
        }
        if prompt == "truncate" {
            frames.push(Ok(br#"{"text":["trunc"#.to_vec()));
        }
        return Body::from_stream(futures::stream::iter(frames)).into_response();
    }

    Json(json!({ "text": vec![format!("{prompt}five"); n] })).into_response()
}

async fn spawn_server() -> String {
    let app = Router::new().route("/generate", post(generate));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn test_generate_over_http() {
    let client = GenerationClient::new(&spawn_server().await).unwrap();
    let params = SamplingParams::builder().n(3).temperature(0.7).build().unwrap();

    let texts = client.generate("Fingers: ", &params).await.unwrap();
    assert_eq!(texts, vec!["Fingers: five"; 3]);
}

#[tokio::test]
async fn test_stream_over_http() {
    let config = ClientConfig::new(spawn_server().await).with_stream_buffer_capacity(8);
    let client = GenerationClient::from_config(&config).unwrap();

    let frames = client
        .stream("Q: ", &SamplingParams::default())
        .await
        .unwrap()
        .collect_frames()
        .await
        .unwrap();

    let firsts: Vec<&str> = frames.iter().map(|f| &f[0]).collect();
    assert_eq!(firsts, vec!["Q: Five", "Q: Five fingers", "Q: Five fingers."]);
    assert_eq!(frames[2].delta_since(Some(&frames[1])), vec!["."]);
}

#[tokio::test]
async fn test_truncated_stream_over_http() {
    let client = GenerationClient::new(&spawn_server().await).unwrap();
    let mut stream = client
        .stream("truncate", &SamplingParams::default())
        .await
        .unwrap();

    let mut frames = 0;
    let mut error = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(_) => frames += 1,
            Err(e) => error = Some(e),
        }
    }

    assert_eq!(frames, 3);
    assert!(error.unwrap().is_protocol());
}

#[tokio::test]
async fn test_error_status_is_transport_error() {
    let client = GenerationClient::new(&spawn_server().await).unwrap();

    let err = client
        .generate("fail", &SamplingParams::default())
        .await
        .unwrap_err();
    assert!(err.is_transport());

    let source = err.transport_source().unwrap();
    let http = source.downcast_ref::<reqwest::Error>().unwrap();
    assert_eq!(http.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));

    let err = client
        .stream("fail", &SamplingParams::default())
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = GenerationClient::new(&format!("http://{addr}")).unwrap();
    let err = client
        .generate("Hi", &SamplingParams::default())
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_parallel_generation() {
    let client = GenerationClient::new(&spawn_server().await).unwrap();
    let params = SamplingParams::builder().temperature(0.5).build().unwrap();

    let calls = (0..10).map(|i| {
        let client = client.clone();
        let params = params.clone();
        tokio::spawn(async move {
            let request = GenerationRequest::new(format!("#{i} "), params);
            client.generate_with(request, &CancellationToken::new()).await
        })
    });

    for (i, call) in futures::future::join_all(calls).await.into_iter().enumerate() {
        let texts = call.unwrap().unwrap();
        assert_eq!(texts, vec![format!("#{i} five")]);
    }
}
