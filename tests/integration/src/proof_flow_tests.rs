//! Device → relay → registry flows with the reference backend.

use crate::test_utils::*;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use geoproof_core::{GeoCell, GeoCoordinate, ProofMode, PublicInputs};
use geoproof_location::{FixBehavior, Location};
use geoproof_prover::{ProofError, Remediation};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_label(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/label")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_labels(prefix: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/label?prefix={prefix}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_proof_backed_review_reaches_relay_and_registry() {
    init_tracing();
    let device = TestDevice::at("alice", eiffel().offset(12.0, 300.0), ProofMode::OnChain);
    let artifact = device.lifecycle.run(eiffel(), 50).await.unwrap();
    assert_eq!(artifact.geo_cell.as_str(), "u09tunq");

    // On-chain path
    let mut registry = registry();
    let event = registry
        .submit(
            &device.prover_id,
            &artifact.proof_bytes,
            &artifact.public_input_bytes,
            &artifact.geo_cell.to_bytes32(),
            now_unix(),
        )
        .unwrap();
    assert_eq!(event.radius_meters, 50);
    assert_eq!(event.public_input_hash, artifact.public_input_hash);

    // Off-chain path
    let relay = relay();
    let (status, body) = send(
        &relay,
        post_label(json!({
            "proverId": device.prover_hex(),
            "proofHex": artifact.proof_hex(),
            "publicInputsHex": artifact.public_inputs_hex(),
            "geohash7": artifact.geo_cell.as_str(),
            "review": {"categories": ["landmark", "view"], "rating": 5, "text": "Worth the climb"},
            "expiresAt": null
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["publicInputHash"], json!(artifact.public_input_hash.to_hex()));

    let (status, body) = send(&relay, get_labels("u09t")).await;
    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["categories"], json!(["landmark", "view"]));

    // The decoded cell center lies inside the cell that was submitted
    let center = GeoCell::parse("u09tunq", 7).unwrap().bounds().center();
    assert!((data[0]["center"]["lat"].as_f64().unwrap() - center.latitude).abs() < 1e-9);
}

#[tokio::test]
async fn test_walking_into_the_fence() {
    let device = TestDevice::at("bob", eiffel().offset(80.0, 0.0), ProofMode::OffChain);

    let err = device.lifecycle.run(eiffel(), 50).await.unwrap_err();
    assert!(matches!(err, ProofError::OutsideRadius { .. }));
    assert_eq!(err.remediation(), Remediation::MoveCloser);
    assert_eq!(device.lifecycle.metrics().snapshot().prove_calls, 0);

    // Retrying from scratch after moving closer succeeds
    device
        .platform
        .set_fix(FixBehavior::Deliver(Location::new(eiffel().offset(10.0, 0.0))));
    let artifact = device.lifecycle.run(eiffel(), 50).await.unwrap();
    assert_eq!(artifact.mode, ProofMode::OffChain);
    assert_eq!(device.lifecycle.metrics().snapshot().prove_calls, 1);
    assert_eq!(device.lifecycle.key_cache().metrics().snapshot().computations, 1);
}

#[tokio::test]
async fn test_same_spot_replays_on_chain_but_supersedes_off_chain() {
    let device = TestDevice::at("carol", eiffel(), ProofMode::OnChain);
    let first = device.lifecycle.run(eiffel(), 50).await.unwrap();
    let second = device.lifecycle.run(eiffel(), 50).await.unwrap();
    assert_eq!(first.public_input_bytes, second.public_input_bytes);

    let mut registry = registry();
    let cell = first.geo_cell.to_bytes32();
    registry
        .submit(&device.prover_id, &first.proof_bytes, &first.public_input_bytes, &cell, 1)
        .unwrap();
    let replay = registry
        .submit(&device.prover_id, &second.proof_bytes, &second.public_input_bytes, &cell, 2)
        .unwrap_err();
    assert_eq!(replay.revert_reason(), "AlreadyUsed");

    let relay = relay();
    for text in ["First visit", "Second visit"] {
        let (status, _) = send(
            &relay,
            post_label(json!({
                "proverId": device.prover_hex(),
                "publicInputsHex": second.public_inputs_hex(),
                "geohash7": "u09tunq",
                "review": {"categories": ["landmark"], "rating": 4, "text": text},
                "expiresAt": null
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = send(&relay, get_labels("u09tunq")).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["text"], "Second visit");
}

#[tokio::test]
async fn test_other_prover_cannot_reuse_public_inputs_on_chain() {
    let alice = TestDevice::at("alice", eiffel(), ProofMode::OnChain);
    let mallory = TestDevice::at("mallory", eiffel().offset(5.0, 90.0), ProofMode::OnChain);

    let honest = alice.lifecycle.run(eiffel(), 100).await.unwrap();
    let copied = mallory.lifecycle.run(eiffel(), 100).await.unwrap();

    let mut registry = registry();
    let cell = honest.geo_cell.to_bytes32();
    registry
        .submit(&alice.prover_id, &honest.proof_bytes, &honest.public_input_bytes, &cell, 10)
        .unwrap();

    let err = registry
        .submit(&mallory.prover_id, &copied.proof_bytes, &copied.public_input_bytes, &cell, 11)
        .unwrap_err();
    assert!(err.is_replay());

    let events = registry.events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].prover, alice.prover_id);
}

#[tokio::test]
async fn test_off_chain_proof_rejected_by_registry() {
    let device = TestDevice::at("dave", eiffel(), ProofMode::OffChain);
    let artifact = device.lifecycle.run(eiffel(), 50).await.unwrap();

    let err = registry()
        .submit(
            &device.prover_id,
            &artifact.proof_bytes,
            &artifact.public_input_bytes,
            &artifact.geo_cell.to_bytes32(),
            1,
        )
        .unwrap_err();
    assert_eq!(err.revert_reason(), "VerificationFailed");
}

#[tokio::test]
async fn test_relay_rejects_public_inputs_for_another_cell() {
    let relay = relay();
    let liberty = GeoCoordinate::new(40.6892, -74.0445).unwrap();
    let elsewhere = PublicInputs::from_target(&liberty, 50);

    let (status, body) = send(
        &relay,
        post_label(json!({
            "proverId": "0x01",
            "publicInputsHex": elsewhere.to_hex(),
            "geohash7": "u09tunq",
            "review": {"categories": ["landmark"], "rating": 3, "text": "Not actually here"},
            "expiresAt": null
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "geohash_mismatch");
}
