use anyhow::bail;
use mosaic_signage::config::{QueueOptions, RenderOptions};
use mosaic_signage::media::{MediaClassifier, MediaRole};
use mosaic_signage::playlist::{
    PlaylistBuilder, PlaylistItem, RenderState, rendered_path_for, scratch_path_for,
};
use mosaic_signage::render::{JobRunner, QueueKind, RenderJob, RenderQueues};
use mosaic_signage::tasks::render::{self, RenderOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

/// Writes each job's output and fails on the n-th call when asked to.
#[derive(Default)]
struct StubRunner {
    fail_on_call: Option<usize>,
    calls: Mutex<Vec<PathBuf>>,
}

impl StubRunner {
    fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl JobRunner for StubRunner {
    async fn run(&self, job: &RenderJob) -> anyhow::Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(job.output().to_path_buf());
            calls.len()
        };
        fs::write(job.output(), b"rendered")?;
        if self.fail_on_call == Some(call) {
            bail!("stub failure on call {call}");
        }
        Ok(())
    }
}

fn pending_item(dir: &Path, name: &str, role: MediaRole) -> Arc<PlaylistItem> {
    let source = dir.join(name);
    fs::write(&source, b"x").unwrap();
    let rendered = rendered_path_for(&source, role);
    let jobs = RenderJob::plan(
        role,
        &source,
        &scratch_path_for(&rendered),
        &RenderOptions::default(),
    );
    Arc::new(PlaylistItem::new(
        source,
        rendered,
        role,
        None,
        jobs,
        RenderState::Pending,
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn successful_render_flips_item_to_done() {
    let tmp = tempdir().unwrap();
    let item = pending_item(tmp.path(), "01-bild.jpg", MediaRole::Picture);
    let runner = StubRunner::default();

    let outcome = render::process(QueueKind::Image, &item, &runner).await;
    assert_eq!(outcome, RenderOutcome::Rendered);
    assert_eq!(item.render_state(), RenderState::Done);
    assert_eq!(runner.calls(), vec![item.scratch_path(), item.scratch_path()]);
    assert_eq!(item.playable_path(), tmp.path().join("01-bild.jpg.mosaic.jpg"));
    assert_eq!(fs::read(item.rendered_path()).unwrap(), b"rendered");
    assert!(!item.scratch_path().exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rendition_appears_only_when_every_job_finished() {
    let tmp = tempdir().unwrap();
    let item = pending_item(tmp.path(), "01-bild.jpg", MediaRole::Picture);
    let (queues, mut receivers) = RenderQueues::channel(&QueueOptions::default());
    let builder = PlaylistBuilder::new(
        queues,
        MediaClassifier::default(),
        RenderOptions::default(),
    );

    // First job done, second not yet run: what a rescan sees mid-render.
    fs::write(item.scratch_path(), b"fitted but not tiled").unwrap();
    let dir = tmp.path().to_path_buf();
    let playlist = tokio::task::spawn_blocking(move || builder.build(&dir).unwrap())
        .await
        .unwrap();
    assert_eq!(playlist.len(), 1);
    assert_eq!(playlist[0].render_state(), RenderState::Pending);
    assert_eq!(playlist[0].playable_path(), item.source_path());
    assert!(receivers.image.try_recv().is_ok());
    assert!(receivers.orphans.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_render_stays_pending_and_removes_partial_output() {
    let tmp = tempdir().unwrap();
    let item = pending_item(tmp.path(), "01-bild.jpg", MediaRole::Picture);
    let runner = StubRunner::failing_on(2);

    let outcome = render::process(QueueKind::Image, &item, &runner).await;
    assert_eq!(outcome, RenderOutcome::Failed);
    assert_eq!(item.render_state(), RenderState::Pending);
    assert!(!item.rendered_path().exists());
    assert!(!item.scratch_path().exists());
    assert!(item.source_path().exists());
    assert_eq!(item.playable_path(), item.source_path());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn done_item_is_not_rendered_twice() {
    let tmp = tempdir().unwrap();
    let item = pending_item(tmp.path(), "01-video.mp4", MediaRole::Video);
    let runner = StubRunner::default();

    assert_eq!(
        render::process(QueueKind::Video, &item, &runner).await,
        RenderOutcome::Rendered
    );
    assert_eq!(
        render::process(QueueKind::Video, &item, &runner).await,
        RenderOutcome::AlreadyRendered
    );
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn source_queued_by_two_rescans_renders_once() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("01-video.mp4"), b"x").unwrap();
    let (queues, mut receivers) = RenderQueues::channel(&QueueOptions::default());
    let builder = PlaylistBuilder::new(
        queues,
        MediaClassifier::default(),
        RenderOptions::default(),
    );

    // Two rescans before the worker gets to the first request.
    let dir = tmp.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        builder.build(&dir).unwrap();
        builder.build(&dir).unwrap();
    })
    .await
    .unwrap();
    let first = receivers.video.try_recv().unwrap().0;
    let second = receivers.video.try_recv().unwrap().0;
    assert!(!Arc::ptr_eq(&first, &second));

    let runner = StubRunner::default();
    assert_eq!(
        render::process(QueueKind::Video, &first, &runner).await,
        RenderOutcome::Rendered
    );
    assert_eq!(
        render::process(QueueKind::Video, &second, &runner).await,
        RenderOutcome::AlreadyRendered
    );
    assert_eq!(runner.calls().len(), 1);
    assert!(second.is_rendered());
    assert_eq!(second.playable_path(), tmp.path().join("01-video.mp4.mosaic.mov"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_renders_in_arrival_order() {
    let tmp = tempdir().unwrap();
    let (queues, receivers) = RenderQueues::channel(&QueueOptions::default());
    let runner = Arc::new(StubRunner::default());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(render::run(
        QueueKind::Video,
        receivers.video,
        Arc::clone(&runner),
        cancel.clone(),
    ));

    let items: Vec<_> = ["03-video.mp4", "01-video.mp4", "02-banner-video.mp4"]
        .iter()
        .map(|name| {
            let role = if name.contains("banner") {
                MediaRole::BannerVideo
            } else {
                MediaRole::Video
            };
            pending_item(tmp.path(), name, role)
        })
        .collect();
    for item in &items {
        assert_eq!(queues.submit(Arc::clone(item)).await.unwrap(), QueueKind::Video);
    }
    // The same item again is a no-op once it is done.
    queues.submit(Arc::clone(&items[0])).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !items.iter().all(|i| i.is_rendered()) || runner.calls().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout waiting for renders");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let expected: Vec<PathBuf> = items.iter().map(|i| i.scratch_path()).collect();
    assert_eq!(runner.calls(), expected);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pictures_route_to_the_image_queue() {
    let tmp = tempdir().unwrap();
    let (queues, mut receivers) = RenderQueues::channel(&QueueOptions::default());
    let item = pending_item(tmp.path(), "01-banner-bild.jpg", MediaRole::BannerPicture);
    assert_eq!(queues.submit(Arc::clone(&item)).await.unwrap(), QueueKind::Image);
    let queued = receivers.image.try_recv().unwrap();
    assert!(Arc::ptr_eq(&queued.0, &item));
    assert!(receivers.video.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_fails_once_the_worker_is_gone() {
    let tmp = tempdir().unwrap();
    let (queues, receivers) = RenderQueues::channel(&QueueOptions::default());
    drop(receivers);
    let item = pending_item(tmp.path(), "01-video.mp4", MediaRole::Video);
    assert!(queues.submit(item).await.is_err());
}
