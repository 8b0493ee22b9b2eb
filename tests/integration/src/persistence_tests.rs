//! Stores reopened from disk keep their guarantees.

use crate::test_utils::*;
use geoproof_core::{GeoCell, ProofMode};
use geoproof_ledger::{SubmissionLedger, SubmissionRecord};
use geoproof_relay::{router, AppState};
use std::collections::BTreeSet;
use std::sync::Arc;

#[tokio::test]
async fn test_relay_state_survives_restart() {
    let path = temp_db_path("relay");
    let mut config = relay_config();
    config.ledger.path = path.clone();

    let device = TestDevice::at("erin", eiffel(), ProofMode::OffChain);
    let artifact = device.lifecycle.run(eiffel(), 50).await.unwrap();

    {
        let state = AppState::new(config.clone()).unwrap();
        state
            .ledger
            .lock()
            .await
            .submit(SubmissionRecord {
                prover_id: device.prover_id.clone(),
                geo_cell: artifact.geo_cell.clone(),
                categories: BTreeSet::from(["landmark".to_string()]),
                rating: 5,
                text: "Sunset was perfect".to_string(),
                timestamp_unix: now_unix(),
                proof_bytes: Some(artifact.proof_bytes.clone()),
                public_input_bytes: Some(artifact.public_input_bytes.clone()),
                expires_at_unix: None,
            })
            .unwrap();
    }

    // Reopen the same file
    let ledger = SubmissionLedger::open(&path, &config.ledger).unwrap();
    let found = ledger
        .get_by_public_input_hash(&artifact.public_input_hash)
        .unwrap()
        .unwrap();
    assert_eq!(found.geo_cell, GeoCell::parse("u09tunq", 7).unwrap());
    drop(ledger);

    // Relay reopens the existing file
    let app = router(Arc::new(AppState::new(config).unwrap()));
    drop(app);
    remove_db(&path);
}
