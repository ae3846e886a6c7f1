//! Concurrent-clients scenario (spec.md §8, scenario 7): 10 threads each
//! upload and download a distinct file against one shared cluster; every
//! CID must match its original.

mod common;

use std::sync::Arc;

use causeway_client::Client;

#[test]
fn ten_concurrent_clients_each_round_trip_a_distinct_file() {
    let storage_a = common::start_storage();
    let storage_b = common::start_storage();
    let chain = common::start_metadata_chain(45310, 3);

    let client = Arc::new(
        Client::new(
            vec![storage_a.addr.clone(), storage_b.addr.clone()],
            chain.iter().map(|m| m.addr.clone()).collect(),
        )
        .unwrap(),
    );

    const CLIENT_COUNT: usize = 10;
    let threads: Vec<_> = (0..CLIENT_COUNT)
        .map(|i| {
            let client = client.clone();
            std::thread::spawn(move || -> Result<(), String> {
                let content = common::pseudo_random_bytes(64 * 1024 + i, i as u64);
                let input_path = std::env::temp_dir().join(format!("causeway-it-concurrent-{i}-in"));
                let output_path = std::env::temp_dir().join(format!("causeway-it-concurrent-{i}-out"));
                std::fs::write(&input_path, &content).map_err(|e| e.to_string())?;

                let upload_cid = client.upload(&input_path).map_err(|e| e.to_string())?;
                let filename = input_path.file_name().unwrap().to_string_lossy().into_owned();
                let download_cid = client
                    .download(&filename, &output_path)
                    .map_err(|e| e.to_string())?;

                let result = if upload_cid != download_cid {
                    Err(format!("client {i}: CID mismatch"))
                } else if std::fs::read(&output_path).map_err(|e| e.to_string())? != content {
                    Err(format!("client {i}: content mismatch"))
                } else {
                    Ok(())
                };

                std::fs::remove_file(&input_path).ok();
                std::fs::remove_file(&output_path).ok();
                result
            })
        })
        .collect();

    let failures: Vec<String> = threads
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter_map(Result::err)
        .collect();

    assert!(failures.is_empty(), "concurrent client failures: {failures:?}");

    storage_a.stop();
    storage_b.stop();
    chain.into_iter().for_each(|n| n.stop());
}
