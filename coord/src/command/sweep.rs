use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use common::schemas::FileState;
use common::time_utils::utc_now_ms;

use crate::core::meta::MetaDb;

#[derive(Parser, Debug, Clone)]
pub struct SweepArgs {
    #[arg(long, default_value = "./data/index")]
    pub index: PathBuf,

    /// Age after which an uncommitted upload counts as abandoned (e.g. "20s", "5m")
    #[arg(long, default_value = "20s", value_parser = humantime::parse_duration)]
    pub stale_after: Duration,

    /// Dry run: report only
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub committed: usize,
    pub uploading: usize,
    pub abandoned: usize,
    pub deleted: usize,
}

/// Deletes the rows of abandoned uploads. Each delete re-checks the row, so
/// a session that checkpointed after the scan survives.
pub fn sweep_db(
    db: &MetaDb,
    now_ms: i128,
    stale_after: Duration,
    dry_run: bool,
) -> anyhow::Result<SweepReport> {
    let mut report = SweepReport::default();

    for record in db.files()? {
        report.scanned += 1;
        match record.state(now_ms, stale_after) {
            FileState::Committed => report.committed += 1,
            FileState::Uploading => report.uploading += 1,
            FileState::Abandoned => {
                report.abandoned += 1;
                if dry_run {
                    info!(filename = %record.name, epoch = record.epoch, "would delete abandoned upload");
                    continue;
                }
                if db.delete_stale_file(&record.name, now_ms, stale_after)? {
                    report.deleted += 1;
                    info!(filename = %record.name, "deleted abandoned upload");
                } else {
                    warn!(filename = %record.name, "upload resumed during sweep, kept");
                }
            }
        }
    }

    Ok(report)
}

pub async fn sweep(args: SweepArgs) -> anyhow::Result<()> {
    let db = MetaDb::open(&args.index)?;
    let report = sweep_db(&db, utc_now_ms(), args.stale_after, args.dry_run)?;

    info!(
        scanned = report.scanned,
        committed = report.committed,
        uploading = report.uploading,
        abandoned = report.abandoned,
        deleted = report.deleted,
        dry_run = args.dry_run,
        "sweep complete"
    );

    Ok(())
}
