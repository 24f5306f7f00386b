//! Walk the dataset tree and stamp every entity in it.
//!
//! Saving always touches the whole subtree under the save point rather than working out which members
//! actually changed. The walkers are the only place that knows the shape of the tree, so a finer-grained
//! strategy could replace them without the merge noticing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::dataset::{Dataset, Object};
use crate::version::{ensure, touch};

/// Id prefixes, one per kind of entity.
pub mod kind {
    pub const PROJECT: &str = "project";
    pub const RECORD: &str = "record";
    pub const CALL: &str = "call";
    pub const EQUIPMENT: &str = "equipment";
    pub const POINT_FILE: &str = "pointfile";
    pub const POINT: &str = "point";
    pub const BOOKMARK: &str = "bookmark";
    pub const NAV_TARGET: &str = "navtarget";
    pub const LOCALIZATION: &str = "localization";
    pub const LOCALIZED_POINT: &str = "locpoint";
    pub const EVIDENCE: &str = "evidence";
    pub const TIE: &str = "tie";
    pub const SETTINGS: &str = "settings";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stamp {
    /// Fill in missing metadata only.
    Ensure,
    /// Fill in missing metadata, bump the version and restamp `updatedAt`.
    Touch(DateTime<Utc>),
}

impl Stamp {
    pub fn apply(self, entity: &mut Object, kind_prefix: &str) {
        match self {
            Stamp::Ensure => {
                ensure(entity, kind_prefix);
            }
            Stamp::Touch(at) => {
                touch(entity, kind_prefix, at);
            }
        }
    }

    pub fn dataset(self, dataset: &mut Dataset) {
        for project in dataset.projects.values_mut() {
            self.project(project);
        }
        for evidence in dataset.evidence.values_mut() {
            self.evidence(evidence);
        }
        self.apply(&mut dataset.global_settings, kind::SETTINGS);
    }

    pub fn project(self, project: &mut Object) {
        self.apply(project, kind::PROJECT);

        if let Some(Value::Object(records)) = project.get_mut("records") {
            for record in records.values_mut() {
                if let Value::Object(record) = record {
                    self.apply(record, kind::RECORD);
                    self.members(record, "calls", kind::CALL);
                }
            }
        }

        self.members(project, "equipmentLog", kind::EQUIPMENT);

        if let Some(Value::Array(point_files)) = project.get_mut("pointFiles") {
            for point_file in point_files {
                if let Value::Object(point_file) = point_file {
                    self.apply(point_file, kind::POINT_FILE);
                    self.members(point_file, "points", kind::POINT);
                    self.members(point_file, "originalPoints", kind::POINT);
                }
            }
        }

        if let Some(Value::Object(navigation)) = project.get_mut("navigation") {
            self.members(navigation, "bookmarks", kind::BOOKMARK);
            if let Some(Value::Object(target)) = navigation.get_mut("target") {
                self.apply(target, kind::NAV_TARGET);
            }
        }

        if let Some(Value::Object(localization)) = project.get_mut("localization") {
            self.apply(localization, kind::LOCALIZATION);
            self.members(localization, "points", kind::LOCALIZED_POINT);
        }
    }

    pub fn evidence(self, evidence: &mut [Value]) {
        for entry in evidence {
            if let Value::Object(entry) = entry {
                self.apply(entry, kind::EVIDENCE);
                self.members(entry, "ties", kind::TIE);
            }
        }
    }

    fn members(self, parent: &mut Object, field: &str, kind_prefix: &str) {
        if let Some(Value::Array(members)) = parent.get_mut(field) {
            for member in members {
                if let Value::Object(member) = member {
                    self.apply(member, kind_prefix);
                }
            }
        }
    }
}

pub fn ensure_dataset(dataset: &mut Dataset) {
    Stamp::Ensure.dataset(dataset);
}

pub fn touch_dataset(dataset: &mut Dataset, at: DateTime<Utc>) {
    Stamp::Touch(at).dataset(dataset);
}

pub fn ensure_project(project: &mut Object) {
    Stamp::Ensure.project(project);
}

pub fn touch_project(project: &mut Object, at: DateTime<Utc>) {
    Stamp::Touch(at).project(project);
}

pub fn touch_evidence(evidence: &mut [Value], at: DateTime<Utc>) {
    Stamp::Touch(at).evidence(evidence);
}

pub fn touch_settings(settings: &mut Object, at: DateTime<Utc>) {
    Stamp::Touch(at).apply(settings, kind::SETTINGS);
}
