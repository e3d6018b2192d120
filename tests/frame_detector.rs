use std::sync::atomic::AtomicBool;

use frame_detector::catalog::COCO_2017_TRAIN;
use frame_detector::visualize::{class_color, FileDisplay};
use frame_detector::{
    BackendRegistry, BoundingBox, ClassCatalog, DisplayMode, Frame, FrameDetector, Instance,
    NodeConfig, NullDisplay, Predictor, ScriptedPredictor, StubPredictor,
};

fn small_config() -> NodeConfig {
    let mut cfg = NodeConfig::default();
    cfg.image.width = 64;
    cfg.image.height = 48;
    cfg.display.mode = DisplayMode::None;
    cfg
}

fn coco() -> ClassCatalog {
    ClassCatalog::for_dataset(COCO_2017_TRAIN).unwrap()
}

fn three_instances() -> Vec<Instance> {
    vec![
        Instance::new(0, BoundingBox::new(0.0, 0.0, 10.0, 20.0), 0.95),
        Instance::new(1, BoundingBox::new(20.0, 5.0, 40.0, 25.0), 0.9),
        Instance::new(0, BoundingBox::new(30.0, 10.0, 50.0, 40.0), 0.8),
    ]
}

fn patterned_frame(width: u32, height: u32) -> Frame {
    let data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
    Frame::from_bgr8(width, height, data).unwrap()
}

#[test]
fn show_all_reports_every_instance_aligned() {
    let mut node = FrameDetector::new(
        small_config(),
        Box::new(ScriptedPredictor::new(three_instances())),
        coco(),
        Box::new(NullDisplay),
    );
    let report = node.detect().unwrap();

    assert_eq!(report.total_instances, 3);
    assert_eq!(report.bbox_coordinates.len(), 3);
    assert_eq!(report.bbox_centers.len(), 3);
    for (i, instance) in three_instances().iter().enumerate() {
        assert_eq!(report.bbox_coordinates[i], instance.bbox.to_array());
        assert_eq!(report.bbox_centers[i], instance.bbox.center());
    }
    let labels: Vec<(&str, usize)> = report
        .class_counts
        .iter()
        .map(|c| (c.label.as_str(), c.count))
        .collect();
    assert_eq!(labels, vec![("person", 2), ("bicycle", 1)]);
}

#[test]
fn target_class_keeps_matching_instances_in_order() {
    let mut cfg = small_config();
    cfg.visualization.all_classes = false;
    cfg.visualization.target = 0;
    let mut node = FrameDetector::new(
        cfg,
        Box::new(ScriptedPredictor::new(three_instances())),
        coco(),
        Box::new(NullDisplay),
    );
    let report = node.detect().unwrap();

    let expected = three_instances();
    assert_eq!(
        report.bbox_coordinates,
        vec![expected[0].bbox.to_array(), expected[2].bbox.to_array()]
    );
    assert_eq!(
        report.bbox_centers,
        vec![expected[0].bbox.center(), expected[2].bbox.center()]
    );
    // Counts still cover every detected class.
    assert_eq!(report.class_counts.len(), 2);
}

#[test]
fn detect_uses_the_frame_just_set() {
    let cfg = small_config();
    let mut node = FrameDetector::new(
        cfg,
        Box::new(StubPredictor::new(0.0)),
        coco(),
        Box::new(NullDisplay),
    );

    let blank = node.detect().unwrap();
    assert_eq!(blank.frame_seq, 0);
    assert_eq!(blank.total_instances, 0);

    let frame = patterned_frame(64, 48);
    let expected = StubPredictor::new(0.0).predict(&frame).unwrap();
    let seq = node.on_frame(frame).unwrap();

    let report = node.detect().unwrap();
    assert_eq!(report.frame_seq, seq);
    assert_eq!(report.total_instances, expected.len());
    let boxes: Vec<[f32; 4]> = expected.iter().map(|i| i.bbox.to_array()).collect();
    assert_eq!(report.bbox_coordinates, boxes);
}

#[test]
fn file_display_receives_one_image_per_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = FrameDetector::new(
        small_config(),
        Box::new(ScriptedPredictor::new(three_instances())),
        coco(),
        Box::new(FileDisplay::new(dir.path())),
    );
    node.on_frame(patterned_frame(64, 48)).unwrap();

    let shutdown = AtomicBool::new(false);
    assert_eq!(node.run(&shutdown, Some(2)).unwrap(), 2);

    let written = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(written, 2);
    let image = image::open(dir.path().join("result_000000.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(image.dimensions(), (64, 48));
}

#[test]
fn target_mode_draws_only_target_instances() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = small_config();
    cfg.image.width = 120;
    cfg.image.height = 80;
    cfg.visualization.all_classes = false;
    cfg.visualization.target = 0;
    let instances = vec![
        Instance::new(1, BoundingBox::new(5.0, 30.0, 40.0, 70.0), 0.9),
        Instance::new(0, BoundingBox::new(60.0, 30.0, 100.0, 70.0), 0.8),
    ];
    let mut node = FrameDetector::new(
        cfg,
        Box::new(ScriptedPredictor::new(instances)),
        coco(),
        Box::new(FileDisplay::new(dir.path())),
    );
    node.detect().unwrap();

    let image = image::open(dir.path().join("result_000000.png"))
        .unwrap()
        .to_rgb8();
    // Class-1 box and the label space above it stay untouched.
    for x in 0..45 {
        for y in 10..75 {
            assert_eq!(image.get_pixel(x, y).0, [0, 0, 0], "pixel ({x}, {y})");
        }
    }
    assert_eq!(image.get_pixel(60, 50).0, class_color(0));
    assert_eq!(image.get_pixel(99, 50).0, class_color(0));
}

#[test]
fn from_config_builds_stub_node() {
    let node = FrameDetector::from_config(small_config(), &BackendRegistry::builtin()).unwrap();
    assert_eq!(node.catalog().dataset, COCO_2017_TRAIN);
    assert_eq!(node.config().image.width, 64);
}

#[test]
fn from_config_rejects_unknown_dataset() {
    let mut cfg = small_config();
    cfg.model.name = "LVISv1-InstanceSegmentation/mask_rcnn_R_50_FPN_1x.yaml".to_string();
    assert!(FrameDetector::from_config(cfg.clone(), &BackendRegistry::builtin()).is_err());

    cfg.model.dataset = Some(COCO_2017_TRAIN.to_string());
    assert!(FrameDetector::from_config(cfg, &BackendRegistry::builtin()).is_ok());
}
