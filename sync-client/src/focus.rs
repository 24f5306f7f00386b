//! Keeping the user's place when the visible dataset is swapped out underneath them.

use reconcile::Dataset;

/// Where the focused input sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusLocator {
    /// The field of class `field_class` in the row labelled `row_label`, e.g. the bearing cell of
    /// call 3. Survives reordering of rows.
    Row {
        row_label: String,
        field_class: String,
    },
    /// A stable element name, for inputs that don't live in a row.
    Named(String),
}

/// Text selection inside the focused input, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSnapshot {
    pub locator: Option<FocusLocator>,
    /// Tried when `locator` is missing or no longer matches anything.
    pub fallback: Option<String>,
    pub selection: Option<Selection>,
}

impl FocusSnapshot {
    /// Locators in the order they should be tried.
    pub fn candidates(&self) -> impl Iterator<Item = FocusLocator> + '_ {
        self.locator
            .iter()
            .cloned()
            .chain(self.fallback.iter().cloned().map(FocusLocator::Named))
    }
}

/// Whatever is showing the dataset to the user.
pub trait Surface: Send + 'static {
    /// `None` when nothing is focused.
    fn capture_focus(&self) -> Option<FocusSnapshot>;

    /// Replace everything visible with `dataset`.
    fn replace(&mut self, dataset: &Dataset);

    /// Focus the input at `locator` and restore `selection` in it. Returns false if there is no
    /// such input.
    fn focus(&mut self, locator: &FocusLocator, selection: Option<Selection>) -> bool;
}

/// Put `dataset` on the surface, keeping focus where it was if the focused input still exists.
/// Returns whether focus was restored.
pub fn refresh<S: Surface + ?Sized>(surface: &mut S, dataset: &Dataset) -> bool {
    let snapshot = surface.capture_focus();
    surface.replace(dataset);

    let Some(snapshot) = snapshot else {
        return false;
    };
    for locator in snapshot.candidates() {
        if surface.focus(&locator, snapshot.selection) {
            return true;
        }
    }
    log::debug!("Focused input is gone after refresh: {snapshot:?}");
    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A surface with a fixed set of inputs that records what happened to it.
    #[derive(Clone, Default)]
    pub(crate) struct FakeSurface {
        pub(crate) state: Arc<Mutex<FakeState>>,
    }

    #[derive(Default)]
    pub(crate) struct FakeState {
        pub(crate) inputs: Vec<FocusLocator>,
        pub(crate) focused: Option<FocusSnapshot>,
        pub(crate) shown: Vec<Dataset>,
        pub(crate) restored: Option<(FocusLocator, Option<Selection>)>,
    }

    impl Surface for FakeSurface {
        fn capture_focus(&self) -> Option<FocusSnapshot> {
            self.state.lock().unwrap().focused.clone()
        }

        fn replace(&mut self, dataset: &Dataset) {
            self.state.lock().unwrap().shown.push(dataset.clone());
        }

        fn focus(&mut self, locator: &FocusLocator, selection: Option<Selection>) -> bool {
            let mut state = self.state.lock().unwrap();
            if !state.inputs.contains(locator) {
                return false;
            }
            state.restored = Some((locator.clone(), selection));
            true
        }
    }

    fn row(label: &str, class: &str) -> FocusLocator {
        FocusLocator::Row {
            row_label: label.into(),
            field_class: class.into(),
        }
    }

    #[test]
    fn restores_the_structural_locator_first() {
        let mut surface = FakeSurface::default();
        {
            let mut state = surface.state.lock().unwrap();
            state.inputs = vec![row("Call 3", "bearing"), FocusLocator::Named("bearing-3".into())];
            state.focused = Some(FocusSnapshot {
                locator: Some(row("Call 3", "bearing")),
                fallback: Some("bearing-3".into()),
                selection: Some(Selection { start: 2, end: 4 }),
            });
        }

        assert!(refresh(&mut surface, &Dataset::default()));
        let state = surface.state.lock().unwrap();
        assert_eq!(state.shown.len(), 1);
        assert_eq!(
            state.restored,
            Some((row("Call 3", "bearing"), Some(Selection { start: 2, end: 4 })))
        );
    }

    #[test]
    fn falls_back_to_the_element_name() {
        let mut surface = FakeSurface::default();
        {
            let mut state = surface.state.lock().unwrap();
            state.inputs = vec![FocusLocator::Named("project-name".into())];
            state.focused = Some(FocusSnapshot {
                locator: Some(row("Call 9", "distance")),
                fallback: Some("project-name".into()),
                selection: None,
            });
        }

        assert!(refresh(&mut surface, &Dataset::default()));
        let restored = surface.state.lock().unwrap().restored.clone();
        assert_eq!(restored, Some((FocusLocator::Named("project-name".into()), None)));
    }

    #[test]
    fn missing_inputs_are_a_silent_no_op() {
        let mut surface = FakeSurface::default();
        surface.state.lock().unwrap().focused = Some(FocusSnapshot {
            locator: Some(row("Call 1", "radius")),
            fallback: None,
            selection: None,
        });

        assert!(!refresh(&mut surface, &Dataset::default()));
        let state = surface.state.lock().unwrap();
        assert_eq!(state.shown.len(), 1);
        assert!(state.restored.is_none());
    }

    #[test]
    fn nothing_focused_still_replaces() {
        let mut surface = FakeSurface::default();
        assert!(!refresh(&mut surface, &Dataset::default()));
        assert_eq!(surface.state.lock().unwrap().shown.len(), 1);
    }
}
