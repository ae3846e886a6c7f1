//! End-to-end round-trip scenarios over real nodes (spec.md §8, scenarios
//! 1-4): small file, exact chunk-size boundary, multi-chunk, non-aligned.

mod common;

use causeway_client::Client;
use causeway_core::chunk;

#[test]
fn round_trip_across_concrete_file_size_scenarios() {
    let storage_a = common::start_storage();
    let storage_b = common::start_storage();
    let chain = common::start_metadata_chain(45110, 3);

    let client = Client::new(
        vec![storage_a.addr.clone(), storage_b.addr.clone()],
        chain.iter().map(|m| m.addr.clone()).collect(),
    )
    .unwrap();

    let scenarios: Vec<(&str, usize, u32)> = vec![
        ("small_100kib", 100 * 1024, 1),
        ("boundary_chunk_size", chunk::CHUNK_SIZE, 1),
        ("multi_chunk_5mib", 5 * 1024 * 1024, 5),
        ("non_aligned", chunk::CHUNK_SIZE + 1, 2),
    ];

    for (label, size, expected_chunks) in scenarios {
        let content = common::pseudo_random_bytes(size, label.len() as u64);
        assert_eq!(
            chunk::split(&content).unwrap().len() as u32,
            expected_chunks,
            "{label}: unexpected chunk count"
        );

        let input_path = std::env::temp_dir().join(format!("causeway-it-{label}-in"));
        let output_path = std::env::temp_dir().join(format!("causeway-it-{label}-out"));
        std::fs::write(&input_path, &content).unwrap();

        let upload_cid = client.upload(&input_path).expect("upload should succeed");
        let filename = input_path.file_name().unwrap().to_string_lossy().into_owned();
        let download_cid = client
            .download(&filename, &output_path)
            .expect("download should succeed");

        assert_eq!(upload_cid, download_cid, "{label}: CID mismatch");
        assert_eq!(
            std::fs::read(&output_path).unwrap(),
            content,
            "{label}: reconstructed content mismatch"
        );

        std::fs::remove_file(&input_path).ok();
        std::fs::remove_file(&output_path).ok();
    }

    storage_a.stop();
    storage_b.stop();
    for node in chain {
        node.stop();
    }
}
