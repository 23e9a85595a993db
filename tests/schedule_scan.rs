use chrono::{NaiveDate, NaiveDateTime};
use mosaic_signage::clock::ManualClock;
use mosaic_signage::config::{QueueOptions, RenderOptions};
use mosaic_signage::media::MediaClassifier;
use mosaic_signage::playlist::PlaylistBuilder;
use mosaic_signage::render::{RenderQueues, RenderReceivers};
use mosaic_signage::schedule::{ScanOutcome, ScheduleParser, ScheduleSnapshot};
use mosaic_signage::store::{ScheduleStore, SelectionSource};
use mosaic_signage::tasks::rescan::{RescanReport, Rescanner};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

fn parser() -> (ScheduleParser, RenderReceivers) {
    let (queues, receivers) = RenderQueues::channel(&QueueOptions::default());
    let builder = PlaylistBuilder::new(
        queues,
        MediaClassifier::default(),
        RenderOptions::default(),
    );
    (ScheduleParser::new(builder), receivers)
}

fn media(dir: &Path, names: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    for name in names {
        fs::write(dir.join(name), b"x").unwrap();
    }
}

fn snapshot(outcome: ScanOutcome) -> ScheduleSnapshot {
    match outcome {
        ScanOutcome::Snapshot(s) => s,
        ScanOutcome::SyncInProgress => panic!("unexpected sync lock"),
    }
}

#[test]
fn once_event_is_selected_inside_its_window() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    media(&root.join("once/2030-01-01/09-17"), &["01-video.mp4"]);
    media(&root.join("standard"), &["01-bild.jpg"]);

    let (parser, _rx) = parser();
    let snap = snapshot(parser.scan(root, at(2029, 12, 31, 12, 0)).unwrap());
    assert_eq!(snap.once_events.len(), 1);
    assert_eq!(snap.once_events[0].start, at(2030, 1, 1, 9, 0));
    assert_eq!(snap.once_events[0].end, at(2030, 1, 1, 17, 0));

    let store = ScheduleStore::default();
    store.install(snap);

    let sel = store.select_current(at(2030, 1, 1, 10, 30));
    assert!(matches!(sel.source, SelectionSource::Once { .. }));
    assert_eq!(sel.valid_until, at(2030, 1, 1, 17, 0));
    assert_eq!(
        sel.playlist[0].source_path(),
        root.join("once/2030-01-01/09-17/01-video.mp4")
    );

    let sel = store.select_current(at(2030, 1, 1, 17, 0));
    assert_eq!(sel.source, SelectionSource::Standard);
    assert_eq!(sel.playlist.len(), 1);
}

#[test]
fn malformed_folders_are_skipped() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    media(&root.join("once/2030-13-99/09-17"), &["01-video.mp4"]);
    media(&root.join("once/2030-01-02/17-09"), &["01-video.mp4"]);
    media(&root.join("once/2030-01-02/9-17"), &["01-video.mp4"]);
    media(&root.join("once/2030-01-02/10-12 lunch"), &["01-video.mp4"]);
    media(&root.join("weekly/8/09-17"), &["01-video.mp4"]);
    fs::write(root.join("once/notes.txt"), b"x").unwrap();

    let (parser, _rx) = parser();
    let snap = snapshot(parser.scan(root, at(2029, 12, 31, 12, 0)).unwrap());
    assert_eq!(snap.once_events.len(), 1);
    assert_eq!(snap.once_events[0].start, at(2030, 1, 2, 10, 0));
    assert_eq!(snap.once_events[0].end, at(2030, 1, 2, 12, 0));
    assert!(snap.weekly_events.is_empty());
    assert!(snap.standard.is_empty());
}

#[test]
fn weekday_seven_is_sunday() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    media(&root.join("weekly/7/00-24"), &["01-bild-5.jpg"]);
    media(&root.join("weekly/2/08-10"), &["01-video.mp4"]);

    let (parser, _rx) = parser();
    let snap = snapshot(parser.scan(root, at(2030, 1, 1, 0, 0)).unwrap());
    let mut days: Vec<u32> = snap.weekly_events.iter().map(|e| e.weekday).collect();
    days.sort();
    assert_eq!(days, vec![0, 2]);

    let store = ScheduleStore::default();
    store.install(snap);
    // 2030-01-06 is a Sunday; the window runs until midnight.
    let sel = store.select_current(at(2030, 1, 6, 23, 59));
    assert_eq!(
        sel.source,
        SelectionSource::Weekly {
            weekday: 0,
            start_hour: 0,
            end_hour: 24
        }
    );
    assert_eq!(sel.valid_until, at(2030, 1, 7, 0, 0));

    // 2030-01-01 is a Tuesday.
    let sel = store.select_current(at(2030, 1, 1, 9, 15));
    assert!(matches!(sel.source, SelectionSource::Weekly { weekday: 2, .. }));
    assert_eq!(sel.valid_until, at(2030, 1, 1, 10, 0));
}

#[test]
fn sync_lock_skips_the_scan() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    media(&root.join("standard"), &["01-video.mp4"]);
    fs::write(root.join("syncInProgress.lock"), b"").unwrap();

    let (parser, mut rx) = parser();
    let outcome = parser.scan(root, at(2030, 1, 1, 0, 0)).unwrap();
    assert!(matches!(outcome, ScanOutcome::SyncInProgress));
    assert!(rx.video.try_recv().is_err());
}

#[test]
fn past_events_are_dropped_before_building() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    media(&root.join("once/2030-01-01/08-10"), &["01-video.mp4"]);
    media(&root.join("once/2030-01-01/10-12"), &["01-bild.jpg"]);

    let (parser, mut rx) = parser();
    let snap = snapshot(parser.scan(root, at(2030, 1, 1, 10, 0)).unwrap());
    assert_eq!(snap.once_events.len(), 1);
    assert_eq!(snap.once_events[0].start, at(2030, 1, 1, 10, 0));
    // The past event's video was never queued.
    assert!(rx.video.try_recv().is_err());
    assert!(rx.image.try_recv().is_ok());
}

#[test]
fn overlapping_events_resolve_to_the_first_folder() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    media(&root.join("once/2030-01-01/09-17"), &["01-video.mp4"]);
    media(&root.join("once/2030-01-01/12-14"), &["01-bild.jpg"]);

    let (parser, _rx) = parser();
    let snap = snapshot(parser.scan(root, at(2030, 1, 1, 0, 0)).unwrap());
    assert_eq!(snap.overlapping_once_events(), vec![(0, 1)]);

    let store = ScheduleStore::default();
    store.install(snap);
    let sel = store.select_current(at(2030, 1, 1, 13, 0));
    assert_eq!(sel.valid_until, at(2030, 1, 1, 17, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_rescan_keeps_previous_schedule() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("media");
    media(&root.join("standard"), &["01-bild.jpg"]);

    let (queues, _rx) = RenderQueues::channel(&QueueOptions::default());
    let parser = ScheduleParser::new(PlaylistBuilder::new(
        queues,
        MediaClassifier::default(),
        RenderOptions::default(),
    ));
    let store = Arc::new(ScheduleStore::default());
    let clock = Arc::new(ManualClock::new(at(2030, 1, 1, 12, 0)));
    let rescanner = Rescanner::new(root.clone(), parser, Arc::clone(&store), clock, None);

    let report = rescanner.rescan_once().await.unwrap();
    assert_eq!(report, RescanReport::Installed { generation: 1 });
    assert_eq!(store.snapshot().standard.len(), 1);

    fs::write(root.join("syncInProgress.lock"), b"").unwrap();
    assert_eq!(rescanner.rescan_once().await.unwrap(), RescanReport::SyncInProgress);
    assert_eq!(store.generation(), 1);

    fs::remove_dir_all(&root).unwrap();
    assert_eq!(rescanner.rescan_once().await.unwrap(), RescanReport::Failed);
    assert_eq!(store.generation(), 1);
    assert_eq!(store.snapshot().standard.len(), 1);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_command_runs_before_scan() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("media");
    fs::create_dir_all(&root).unwrap();
    let marker = root.join("standard");

    let (queues, _rx) = RenderQueues::channel(&QueueOptions::default());
    let parser = ScheduleParser::new(PlaylistBuilder::new(
        queues,
        MediaClassifier::default(),
        RenderOptions::default(),
    ));
    let store = Arc::new(ScheduleStore::default());
    let clock = Arc::new(ManualClock::new(at(2030, 1, 1, 12, 0)));
    let command = format!(
        "mkdir -p '{}' && touch '{}/01-bild.jpg'",
        marker.display(),
        marker.display()
    );
    let rescanner = Rescanner::new(root, parser, Arc::clone(&store), clock, Some(command));

    rescanner.rescan_once().await.unwrap();
    assert_eq!(store.snapshot().standard.len(), 1);
}
