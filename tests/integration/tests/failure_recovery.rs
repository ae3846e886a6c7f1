//! Failure-tolerance scenarios (spec.md §8, scenarios 5-6): a single
//! storage-replica loss must not affect downloads, and a metadata chain
//! must reconfigure around a killed MIDDLE via its pre-set skip link.

mod common;

use std::time::Duration;

use causeway_client::Client;
use causeway_core::digest::HexDigest;
use causeway_core::manifest::FileManifest;
use causeway_core::transport::send_command;

#[test]
fn storage_node_failure_tolerates_single_replica_loss() {
    let storage_a = common::start_storage();
    let storage_b = common::start_storage();
    let chain = common::start_metadata_chain(45210, 1);

    let client = Client::new(
        vec![storage_a.addr.clone(), storage_b.addr.clone()],
        chain.iter().map(|m| m.addr.clone()).collect(),
    )
    .unwrap();

    let content = common::pseudo_random_bytes(256 * 1024, 42);
    let input_path = std::env::temp_dir().join("causeway-it-storage-failure-in");
    let output_path = std::env::temp_dir().join("causeway-it-storage-failure-out");
    std::fs::write(&input_path, &content).unwrap();

    let upload_cid = client.upload(&input_path).expect("upload should succeed with both replicas up");

    storage_a.stop(); // kill one of the two replicas

    let filename = input_path.file_name().unwrap().to_string_lossy().into_owned();
    let download_cid = client
        .download(&filename, &output_path)
        .expect("download should survive a single replica failure");

    assert_eq!(upload_cid, download_cid);
    assert_eq!(std::fs::read(&output_path).unwrap(), content);

    std::fs::remove_file(&input_path).ok();
    std::fs::remove_file(&output_path).ok();
    storage_b.stop();
    chain.into_iter().for_each(|n| n.stop());
}

#[test]
fn chain_failure_recovers_via_skip_link() {
    let mut chain = common::start_metadata_chain(45220, 3);
    let tail = chain.remove(2);
    let middle = chain.remove(1);
    let head = chain.remove(0);

    let digest = HexDigest::of(b"pre-failure");
    let put = format!("PUT pre.bin 1 1 1 {digest} {digest}");
    assert_eq!(
        send_command(&head.addr, &put).as_deref(),
        Some("ACK"),
        "PUT should forward all the way to the live TAIL before any failure"
    );

    middle.kill();
    // Health checks run every 3s (spec.md §4.4); give HEAD one full probe
    // interval plus margin to detect the failure and reconfigure, landing
    // within the spec's documented 3-6s recovery window.
    std::thread::sleep(Duration::from_secs(5));

    let digest2 = HexDigest::of(b"post-failure");
    let put2 = format!("PUT post.bin 1 1 1 {digest2} {digest2}");
    assert_eq!(
        send_command(&head.addr, &put2).as_deref(),
        Some("ACK"),
        "HEAD should have promoted its skip link to `next` by now"
    );

    let status = send_command(&tail.addr, "GET_STATUS").expect("TAIL should still be reachable");
    assert!(status.starts_with("ROLE=TAIL"), "got {status:?}");
    let head_port = head.addr.rsplit(':').next().unwrap();
    assert!(
        status.contains(&format!("PREV={head_port}")),
        "TAIL's PREV should have been updated to HEAD's port after skip-link promotion, got {status:?}"
    );

    let get = send_command(&tail.addr, "GET post.bin").expect("GET should reach the TAIL");
    let body = get
        .strip_prefix("FOUND ")
        .expect("TAIL should hold the manifest written after reconfiguration");
    let manifest = FileManifest::parse_found_body("post.bin", body).unwrap();
    assert_eq!(manifest.root_digest, digest2);

    head.stop();
    middle.stop();
    tail.stop();
}
