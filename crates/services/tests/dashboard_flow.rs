use std::sync::Arc;

use progress_core::model::{CourseId, UserId, Video, VideoId};
use progress_core::time::fixed_clock;
use services::{
    MediaEvent, ProgressServices, ReportedMedia, SharedMedia, TrackerBinding, TrackerConfig,
};
use storage::repository::{CatalogRepository, Storage};

async fn seed_catalog(storage: &Storage, course: &str, videos: usize) -> Vec<VideoId> {
    let mut ids = Vec::with_capacity(videos);
    for i in 0..videos {
        let id = VideoId::new(format!("{course}-{i:02}"));
        let video = Video::new(id.clone(), CourseId::new(course), format!("Lesson {i}"))
            .unwrap()
            .with_duration(100.0)
            .unwrap();
        storage.catalog.upsert_video(&video).await.unwrap();
        ids.push(id);
    }
    ids
}

/// Watch `video` up to `position` through a tracker and close it.
async fn watch(services: &ProgressServices, course: &str, video: &VideoId, position: f64) {
    let media = Arc::new(ReportedMedia::with_duration(100.0));
    let shared: SharedMedia = media.clone();
    let binding = TrackerBinding::new(UserId::new("learner"), video.clone(), CourseId::new(course));
    let mut tracker = services.tracker(binding, Some(shared));
    tracker.load().await.unwrap();
    media.set_position(position);
    tracker.teardown().await;
}

#[tokio::test]
async fn dashboard_reports_course_and_overall_progress() {
    let storage = Storage::in_memory();
    let services = ProgressServices::new(&storage, fixed_clock(), TrackerConfig::default());
    let rust = seed_catalog(&storage, "rust", 4).await;
    let sql = seed_catalog(&storage, "sql", 12).await;

    watch(&services, "rust", &rust[0], 100.0).await;
    watch(&services, "rust", &rust[1], 95.0).await;
    watch(&services, "rust", &rust[2], 94.0).await;
    for id in &sql[..11] {
        watch(&services, "sql", id, 99.0).await;
    }

    let report = services
        .aggregator()
        .compute_progress(
            &UserId::new("learner"),
            &[CourseId::new("rust"), CourseId::new("sql"), CourseId::new("empty")],
        )
        .await
        .unwrap();

    assert_eq!(report.total_courses(), 3);
    let rust_progress = report.course(&CourseId::new("rust")).unwrap();
    assert_eq!((rust_progress.total, rust_progress.completed, rust_progress.progress), (4, 2, 50));
    let sql_progress = report.course(&CourseId::new("sql")).unwrap();
    assert_eq!((sql_progress.total, sql_progress.completed, sql_progress.progress), (12, 11, 92));
    assert!(report.course(&CourseId::new("empty")).is_none());
    // 13 of 16 videos.
    assert_eq!(report.overall_progress(), 81);
}

#[tokio::test]
async fn other_users_progress_is_ignored() {
    let storage = Storage::in_memory();
    let services = ProgressServices::new(&storage, fixed_clock(), TrackerConfig::default());
    let ids = seed_catalog(&storage, "rust", 2).await;
    watch(&services, "rust", &ids[0], 100.0).await;

    let report = services
        .aggregator()
        .compute_progress(&UserId::new("someone-else"), &[CourseId::new("rust")])
        .await
        .unwrap();
    assert_eq!(report.course(&CourseId::new("rust")).unwrap().completed, 0);
    assert_eq!(report.overall_progress(), 0);
}

#[tokio::test(start_paused = true)]
async fn recently_watched_lists_every_opened_video() {
    let storage = Storage::in_memory();
    let services = ProgressServices::new(&storage, fixed_clock(), TrackerConfig::default());
    let ids = seed_catalog(&storage, "rust", 3).await;

    for (id, position) in ids.iter().zip([10.0, 11.0, 12.0]) {
        let media = Arc::new(ReportedMedia::with_duration(100.0));
        let binding = TrackerBinding::new(UserId::new("learner"), id.clone(), CourseId::new("rust"));
        let session = services.start_session(binding, media.clone());
        session.notify(MediaEvent::MetadataLoaded);
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        media.set_position(position);
        session.close().await;
    }

    let recent = services
        .history()
        .recently_watched(&UserId::new("learner"), None)
        .await
        .unwrap();
    assert_eq!(recent.len(), 3);
}
