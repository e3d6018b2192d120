//! Per-frame bookkeeping: class counts and the box/center lists of the
//! selected instances.

use std::fmt::Write as _;

use crate::catalog::ClassCatalog;
use crate::config::VisualizationSettings;
use crate::detect::Instance;

const BLOCK_RULE: &str = "============================";

/// Which instances are reported and drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    AllClasses,
    Target(usize),
}

impl Selection {
    pub fn matches(&self, instance: &Instance) -> bool {
        match self {
            Selection::AllClasses => true,
            Selection::Target(class_id) => instance.class_id == *class_id,
        }
    }
}

impl From<VisualizationSettings> for Selection {
    fn from(settings: VisualizationSettings) -> Self {
        if settings.all_classes {
            Selection::AllClasses
        } else {
            Selection::Target(settings.target)
        }
    }
}

/// Occurrences of one label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCount {
    pub label: String,
    pub count: usize,
}

/// Count each distinct label, in order of first appearance.
pub fn count_classes<S: AsRef<str>>(labels: &[S]) -> Vec<ClassCount> {
    let mut counts: Vec<ClassCount> = Vec::new();
    for label in labels {
        let label = label.as_ref();
        match counts.iter_mut().find(|c| c.label == label) {
            Some(entry) => entry.count += 1,
            None => counts.push(ClassCount {
                label: label.to_string(),
                count: 1,
            }),
        }
    }
    counts
}

/// Instances picked by `selection`, in their original order.
pub fn select_instances<'a>(instances: &'a [Instance], selection: Selection) -> Vec<&'a Instance> {
    instances.iter().filter(|i| selection.matches(i)).collect()
}

/// Box coordinates and centers of the selected instances, index-aligned.
pub fn filter_and_collect(
    instances: &[Instance],
    selection: Selection,
) -> (Vec<[f32; 4]>, Vec<[f32; 2]>) {
    select_instances(instances, selection)
        .into_iter()
        .map(|i| (i.bbox.to_array(), i.bbox.center()))
        .unzip()
}

/// Outcome of one detect cycle. Rebuilt from scratch every cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionReport {
    /// Sequence number of the frame the report was computed from.
    pub frame_seq: u64,
    /// Instances returned by the predictor, before selection.
    pub total_instances: usize,
    pub class_counts: Vec<ClassCount>,
    pub bbox_coordinates: Vec<[f32; 4]>,
    pub bbox_centers: Vec<[f32; 2]>,
}

impl DetectionReport {
    pub fn build(
        frame_seq: u64,
        instances: &[Instance],
        catalog: &ClassCatalog,
        selection: Selection,
    ) -> Self {
        let labels: Vec<String> = instances.iter().map(|i| catalog.name(i.class_id)).collect();
        let (bbox_coordinates, bbox_centers) = filter_and_collect(instances, selection);
        Self {
            frame_seq,
            total_instances: instances.len(),
            class_counts: count_classes(&labels),
            bbox_coordinates,
            bbox_centers,
        }
    }

    /// Number of selected instances.
    pub fn selected(&self) -> usize {
        self.bbox_coordinates.len()
    }

    pub fn detected_line(&self) -> String {
        format!("{} objects have been detected!", self.total_instances)
    }

    /// `count label` lines for every detected class.
    pub fn objects_block(&self) -> String {
        let mut out = String::from("\n========= OBJECTS: =========\n");
        for entry in &self.class_counts {
            let _ = writeln!(out, "{} {}", entry.count, entry.label);
        }
        let _ = writeln!(out, "{}", BLOCK_RULE);
        out
    }

    /// Count, boxes and centers of the selected instances.
    pub fn info_block(&self) -> String {
        let mut out = String::from("========= INFO: ============\n");
        let _ = writeln!(out, "number of target objects: {}", self.selected());
        let _ = writeln!(out, "\n boxes coordinates: \n {:?}", self.bbox_coordinates);
        let _ = writeln!(out, "\n centers coordinates: \n {:?}", self.bbox_centers);
        let _ = writeln!(out, "{}", BLOCK_RULE);
        out
    }
}
