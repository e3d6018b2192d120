//! Class-name catalogs keyed by training dataset.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const COCO_2017_TRAIN: &str = "coco_2017_train";
pub const CITYSCAPES_TRAIN: &str = "cityscapes_fine_instance_seg_train";

const COCO_THING_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

const CITYSCAPES_THING_CLASSES: [&str; 8] = [
    "person",
    "rider",
    "car",
    "truck",
    "bus",
    "train",
    "motorcycle",
    "bicycle",
];

/// Ordered class names for one dataset. Index = model class id.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClassCatalog {
    #[serde(rename = "name")]
    pub dataset: String,
    pub classes: Vec<String>,
}

impl ClassCatalog {
    /// Built-in catalog for a dataset identifier.
    pub fn for_dataset(dataset: &str) -> Result<Self> {
        let classes: &[&str] = match dataset {
            COCO_2017_TRAIN => &COCO_THING_CLASSES,
            CITYSCAPES_TRAIN => &CITYSCAPES_THING_CLASSES,
            other => return Err(anyhow!("no built-in class catalog for dataset '{}'", other)),
        };
        Ok(Self {
            dataset: dataset.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Catalog for the dataset a model was trained on.
    pub fn for_model(model: &str) -> Result<Self> {
        Self::for_dataset(dataset_for_model(model)?)
    }

    /// Load `{"name": "...", "classes": ["...", ...]}` from disk.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read class catalog {}", path.display()))?;
        let catalog: ClassCatalog = serde_json::from_str(&raw)
            .with_context(|| format!("invalid class catalog {}", path.display()))?;
        if catalog.classes.is_empty() {
            return Err(anyhow!("class catalog {} is empty", path.display()));
        }
        Ok(catalog)
    }

    /// Resolve a dataset override: a JSON file path or a built-in dataset id.
    pub fn resolve(model: &str, dataset_override: Option<&str>) -> Result<Self> {
        match dataset_override {
            Some(value) if value.ends_with(".json") => Self::from_json_file(Path::new(value)),
            Some(dataset) => Self::for_dataset(dataset),
            None => Self::for_model(model),
        }
    }

    /// Human-readable name; unknown ids render as `class_<id>`.
    pub fn name(&self, class_id: usize) -> String {
        self.classes
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Training dataset for a model-zoo identifier such as
/// `COCO-InstanceSegmentation/mask_rcnn_R_50_FPN_3x.yaml`.
pub fn dataset_for_model(model: &str) -> Result<&'static str> {
    let family = model.split('/').next().unwrap_or(model);
    if family.starts_with("COCO-") || family == "Misc" {
        Ok(COCO_2017_TRAIN)
    } else if family == "Cityscapes" {
        Ok(CITYSCAPES_TRAIN)
    } else {
        Err(anyhow!(
            "cannot infer training dataset for model '{}'; set model.dataset",
            model
        ))
    }
}
