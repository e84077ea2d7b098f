use std::sync::{Arc, atomic::AtomicBool};

use cutoutfe::ops::{AssertOp, BrushMode, BrushStroke, PixelOp, ResizeSpec, SizePreset};
use cutoutfe::{Edit, EditManager, ImageSource, JobError, Point, Size, Stage};
use image::{Rgba, RgbaImage};

fn opaque(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([90, 140, 30, 255]))
}

fn erase(x: i32, y: i32, diameter: f32) -> Edit {
    Edit::Pixel(PixelOp::Brush(BrushStroke {
        points: vec![Point::new(x, y)],
        diameter,
        mode: BrushMode::Erase,
    }))
}

fn not_cancelled() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[test]
fn finalize_replays_at_full_resolution_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let mut m = EditManager::default();
    m.register_image("a", ImageSource::Buffer(opaque(100, 100)), Some(Size::new(50, 50))).unwrap();
    m.register_image("b", ImageSource::Buffer(opaque(200, 100)), None).unwrap();
    m.register_image("c", ImageSource::Buffer(opaque(30, 30)), None).unwrap();

    m.apply_edit("a", erase(0, 0, 20.0)).unwrap();
    m.apply_edit("b", Edit::Assert(AssertOp::Resize(ResizeSpec::Preset(SizePreset::Small))))
        .unwrap();
    let working_a = m.current("a").unwrap().clone();

    let job = m.start_finalize(Some(dir.path().to_path_buf()), not_cancelled()).unwrap();

    let mut progress = Vec::new();
    let output = job.wait_with_progress(|p| progress.push(p)).unwrap();

    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.last(), Some(&100));

    let ids: Vec<&str> = output.images.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    let (_, full_a) = &output.images[0];
    assert_eq!(full_a.dimensions(), (100, 100));
    assert_eq!(full_a.get_pixel(5, 5)[3], 0);
    assert_eq!(full_a.get_pixel(50, 50)[3], 255);
    assert_eq!(output.images[1].1.dimensions(), (64, 32));

    assert_eq!(output.exported.len(), 3);
    for path in &output.exported {
        assert!(path.exists(), "{} missing", path.display());
    }
    let reloaded = image::open(dir.path().join("b.png")).unwrap();
    assert_eq!((reloaded.width(), reloaded.height()), (64, 32));

    // Sessions are untouched and unlocked afterwards.
    assert_eq!(m.current("a").unwrap(), &working_a);
    assert!(!m.locks().is_busy("a"));
    assert!(m.apply_edit("a", Edit::Undo).unwrap().changed);
}

#[test]
fn finalize_crops_to_tight_bounds_with_padding() {
    let mut m = EditManager::default();
    let mut img = RgbaImage::new(60, 40);
    for y in 10..20 {
        for x in 20..30 {
            img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        }
    }
    m.register_image("obj", ImageSource::Buffer(img), None).unwrap();
    let output = m.start_finalize(None, not_cancelled()).unwrap().wait().unwrap();
    // 10x10 object plus 3px padding on every side.
    assert_eq!(output.images[0].1.dimensions(), (16, 16));
    assert!(output.exported.is_empty());
}

#[test]
fn cancelled_job_reports_cancellation_and_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut m = EditManager::default();
    m.register_image("a", ImageSource::Buffer(opaque(40, 40)), None).unwrap();
    m.apply_edit("a", erase(20, 20, 8.0)).unwrap();
    let before = m.current("a").unwrap().clone();

    let cancel = Arc::new(AtomicBool::new(true));
    let job = m.start_finalize(Some(dir.path().join("out")), cancel).unwrap();
    assert!(job.is_cancel_requested());
    assert!(matches!(job.wait(), Err(JobError::Cancelled)));

    assert_eq!(m.current("a").unwrap(), &before);
    assert!(!dir.path().join("out").join("a.png").exists());
    assert!(m.apply_edit("a", Edit::Undo).is_ok());
}

#[test]
fn edits_are_refused_while_finalize_holds_the_lock() {
    let mut m = EditManager::default();
    m.register_image("a", ImageSource::Buffer(opaque(10, 10)), None).unwrap();
    let guard = m.locks().try_acquire(["a"]).unwrap();
    assert!(m.start_finalize(None, not_cancelled()).is_err());
    drop(guard);
    assert!(m.start_finalize(None, not_cancelled()).unwrap().wait().is_ok());
}

#[test]
fn stages_chain_through_finalize_results() {
    let mut m = EditManager::default();
    m.register_image("a", ImageSource::Buffer(opaque(64, 64)), None).unwrap();
    m.apply_edit("a", erase(0, 0, 10.0)).unwrap();

    let output = m.start_finalize(None, not_cancelled()).unwrap().wait().unwrap();
    assert_eq!(m.advance(output.images).unwrap(), Stage::Enhance);
    assert_eq!(m.image_ids(), ["a".to_string()]);
    assert!(!m.can_undo("a").unwrap());
    // The erased corner is baked into the new stage's original.
    assert_eq!(m.current("a").unwrap().get_pixel(0, 0)[3], 0);
}
