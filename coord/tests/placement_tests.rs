mod common;

use anyhow::Result;
use self::common::{Cluster, FRAGMENT_SIZE, generate_random_bytes};

use ::common::fragment::fragment_name;
use coord::core::placement::placement_offset;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn placement_is_deterministic() -> Result<()> {
    let cluster = Cluster::new(5).await?;

    for name in ["a", "b", "report.pdf", "some dir/with spaces"] {
        let first = cluster.placement(name).await?;
        for _ in 0..3 {
            assert_eq!(cluster.placement(name).await?, first);
        }
        assert_eq!(first.epoch, 5);
        assert_eq!(first.shards.len(), 5);
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn placement_rotates_roster_by_digest_byte() -> Result<()> {
    let cluster = Cluster::new(6).await?;
    let roster: Vec<&str> = cluster.shards.iter().map(|s| s.address.as_str()).collect();

    let placement = cluster.placement("a").await?;
    let offset = placement_offset("a", 6);
    for (i, addr) in placement.shards.iter().enumerate() {
        assert_eq!(addr, roster[(i + offset) % 6]);
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn six_shards_three_fragments() -> Result<()> {
    let cluster = Cluster::new(6).await?;
    let data = generate_random_bytes(3 * FRAGMENT_SIZE);

    let count = cluster.upload_ok("a", data.clone()).await?;
    assert_eq!(count, 3);

    let placement = cluster.placement("a").await?;
    for k in 0..3u64 {
        let name = fragment_name("a", k);
        for shard in &cluster.shards {
            let expected = shard.address == placement.shards[k as usize];
            assert_eq!(shard.has_fragment(&name), expected, "{} on {}", name, shard.address);
        }
    }
    // No fourth fragment anywhere
    assert!(cluster.shards.iter().all(|s| !s.has_fragment("a_3")));

    assert_eq!(cluster.download_ok("a").await?, data);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn placement_survives_roster_growth() -> Result<()> {
    let mut cluster = Cluster::new(2).await?;
    let data = generate_random_bytes(5 * FRAGMENT_SIZE + 100);

    let count = cluster.upload_ok("grow", data.clone()).await?;
    assert_eq!(count, 6);
    let before = cluster.placement("grow").await?;
    assert_eq!(before.epoch, 2);

    for _ in 0..3 {
        cluster.add_shard().await?;
    }

    let after = cluster.placement("grow").await?;
    assert_eq!(after, before);

    // Fragment k stays on S[k mod n] of the creation-time roster
    for k in 0..count {
        let addr = &before.shards[(k % 2) as usize];
        assert!(cluster.shard_at(addr).has_fragment(&fragment_name("grow", k)));
    }
    assert_eq!(cluster.download_ok("grow").await?, data);

    // A new file is spread over the grown roster
    let fresh = cluster.placement("fresh").await?;
    assert_eq!(fresh.epoch, 5);
    assert_eq!(fresh.shards.len(), 5);

    let data = generate_random_bytes(5 * FRAGMENT_SIZE);
    assert_eq!(cluster.upload_ok("fresh", data.clone()).await?, 5);
    for (k, addr) in fresh.shards.iter().enumerate() {
        assert!(cluster.shard_at(addr).has_fragment(&fragment_name("fresh", k as u64)));
    }

    Ok(())
}
