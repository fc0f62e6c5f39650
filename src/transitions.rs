//! Pure state transitions over a single student's measures.
//!
//! Every function borrows the current state and returns a [`Cow`]: `Cow::Borrowed` hands the
//! input back untouched when nothing applies, `Cow::Owned` carries the new state. Clock and
//! id generator are passed in so the results are reproducible.

use std::borrow::Cow;

use chrono::{DateTime, Utc};

use crate::models::{Action, Comment, MeasureInstance, MeasureRef, StudentState};

/// Start a measure for the student.
///
/// An already active instance is left alone. An inactive one is restarted in place and keeps
/// its stored name. Otherwise a fresh instance is put in front of the list.
pub fn activate<'a>(
    state: &'a StudentState,
    measure: MeasureRef<'_>,
    now: impl FnOnce() -> DateTime<Utc>,
) -> Cow<'a, StudentState> {
    match state.position(measure.id) {
        Some(idx) if state.measures[idx].active => Cow::Borrowed(state),
        Some(idx) => {
            let mut next = state.clone();
            let instance = &mut next.measures[idx];
            instance.active = true;
            instance.started_at = now();
            instance.ended_at = None;
            Cow::Owned(next)
        }
        None => {
            let mut measures = Vec::with_capacity(state.measures.len() + 1);
            measures.push(MeasureInstance {
                id: measure.id.to_string(),
                name: measure.name.to_string(),
                active: true,
                started_at: now(),
                ended_at: None,
                comments: Vec::new(),
            });
            measures.extend(state.measures.iter().cloned());
            Cow::Owned(StudentState {
                student_id: state.student_id.clone(),
                measures,
            })
        }
    }
}

/// Flip a measure between active and history.
pub fn toggle_active<'a>(
    state: &'a StudentState,
    measure_id: &str,
    now: impl FnOnce() -> DateTime<Utc>,
) -> Cow<'a, StudentState> {
    let Some(idx) = state.position(measure_id) else {
        return Cow::Borrowed(state);
    };

    let mut next = state.clone();
    let instance = &mut next.measures[idx];
    instance.active = !instance.active;
    if instance.active {
        instance.started_at = now();
        instance.ended_at = None;
    } else {
        instance.ended_at = Some(now());
    }
    Cow::Owned(next)
}

/// Drop a measure and its comments without keeping any history.
pub fn remove<'a>(state: &'a StudentState, measure_id: &str) -> Cow<'a, StudentState> {
    if state.position(measure_id).is_none() {
        return Cow::Borrowed(state);
    }
    Cow::Owned(StudentState {
        student_id: state.student_id.clone(),
        measures: state
            .measures
            .iter()
            .filter(|m| m.id != measure_id)
            .cloned()
            .collect(),
    })
}

/// Prepend a comment to a measure. Whitespace-only text is ignored.
pub fn add_comment<'a>(
    state: &'a StudentState,
    measure_id: &str,
    text: &str,
    now: impl FnOnce() -> DateTime<Utc>,
    make_id: impl FnOnce() -> String,
) -> Cow<'a, StudentState> {
    let text = text.trim();
    if text.is_empty() {
        return Cow::Borrowed(state);
    }
    let Some(idx) = state.position(measure_id) else {
        return Cow::Borrowed(state);
    };

    let mut next = state.clone();
    next.measures[idx].comments.insert(
        0,
        Comment {
            id: make_id(),
            text: text.to_string(),
            created_at: now(),
        },
    );
    Cow::Owned(next)
}

/// Run a write action against the state it targets.
pub fn apply<'a>(
    state: &'a StudentState,
    action: &Action,
    now: impl FnOnce() -> DateTime<Utc>,
    make_id: impl FnOnce() -> String,
) -> Cow<'a, StudentState> {
    match action {
        Action::Activate {
            measure_id,
            measure_name,
            ..
        } => activate(
            state,
            MeasureRef {
                id: measure_id,
                name: measure_name,
            },
            now,
        ),
        Action::Toggle { measure_id, .. } => toggle_active(state, measure_id, now),
        Action::Remove { measure_id, .. } => remove(state, measure_id),
        Action::Comment {
            measure_id, text, ..
        } => add_comment(state, measure_id, text, now, make_id),
        Action::Save {
            state: replacement,
            ..
        } => {
            if replacement == state {
                Cow::Borrowed(state)
            } else {
                Cow::Owned(replacement.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    fn m1() -> MeasureRef<'static> {
        MeasureRef {
            id: "M1",
            name: "Medida 1",
        }
    }

    fn with_m1() -> StudentState {
        activate(&StudentState::empty("A1"), m1(), || at(8)).into_owned()
    }

    #[test]
    fn test_activate_new_measure_goes_first() {
        let start = activate(
            &StudentState::empty("A1"),
            MeasureRef {
                id: "M0",
                name: "Otra",
            },
            || at(7),
        )
        .into_owned();

        let next = activate(&start, m1(), || at(9));
        assert!(matches!(next, Cow::Owned(_)));
        assert_eq!(next.measures.len(), 2);
        let first = &next.measures[0];
        assert_eq!(first.id, "M1");
        assert_eq!(first.name, "Medida 1");
        assert!(first.active);
        assert_eq!(first.started_at, at(9));
        assert!(first.ended_at.is_none());
        assert!(first.comments.is_empty());
        // input untouched
        assert_eq!(start.measures.len(), 1);
    }

    #[test]
    fn test_activate_active_measure_is_noop() {
        let state = with_m1();
        let next = activate(&state, m1(), || at(12));
        assert!(matches!(next, Cow::Borrowed(_)));
        assert_eq!(*next, state);
    }

    #[test]
    fn test_reactivate_keeps_stored_name() {
        let state = toggle_active(&with_m1(), "M1", || at(10)).into_owned();
        let next = activate(
            &state,
            MeasureRef {
                id: "M1",
                name: "Renombrada",
            },
            || at(11),
        );
        assert_eq!(next.measures.len(), 1);
        let m = &next.measures[0];
        assert!(m.active);
        assert_eq!(m.name, "Medida 1");
        assert_eq!(m.started_at, at(11));
        assert!(m.ended_at.is_none());
    }

    #[test]
    fn test_toggle_off_and_on() {
        let off = toggle_active(&with_m1(), "M1", || at(10)).into_owned();
        let m = &off.measures[0];
        assert!(!m.active);
        assert_eq!(m.ended_at, Some(at(10)));
        assert_eq!(m.started_at, at(8));

        let on = toggle_active(&off, "M1", || at(15)).into_owned();
        let m = &on.measures[0];
        assert!(m.active);
        assert!(m.ended_at.is_none());
        assert_eq!(m.started_at, at(15));
    }

    #[test]
    fn test_toggle_unknown_measure_is_noop() {
        let state = with_m1();
        assert!(matches!(
            toggle_active(&state, "M9", || at(10)),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_comments_whitespace_ignored_and_newest_first() {
        let state = with_m1();
        let blank = add_comment(&state, "M1", "   ", || at(9), || "c0".to_string());
        assert!(matches!(blank, Cow::Borrowed(_)));
        assert!(blank.measures[0].comments.is_empty());

        let one = add_comment(&state, "M1", "hola", || at(9), || "c1".to_string()).into_owned();
        assert_eq!(one.measures[0].comments.len(), 1);
        let two = add_comment(&one, "M1", "  adios  ", || at(10), || "c2".to_string());
        let comments = &two.measures[0].comments;
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, "c2");
        assert_eq!(comments[0].text, "adios");
        assert_eq!(comments[0].created_at, at(10));
        assert_eq!(comments[1].text, "hola");
    }

    #[test]
    fn test_comment_on_unknown_measure_is_noop() {
        let state = with_m1();
        assert!(matches!(
            add_comment(&state, "M9", "hola", || at(9), || "c1".to_string()),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_remove() {
        let state = with_m1();
        let same = remove(&state, "M9");
        assert!(matches!(same, Cow::Borrowed(_)));
        assert_eq!(same.measures.len(), 1);

        let gone = remove(&state, "M1");
        assert!(gone.measures.is_empty());
        assert!(gone.find("M1").is_none());
    }

    #[test]
    fn test_apply_save_replaces_state() {
        let state = with_m1();
        let action = Action::Save {
            student_id: "A1".to_string(),
            state: StudentState::empty("A1"),
        };
        let next = apply(&state, &action, || at(9), || "x".to_string());
        assert!(next.measures.is_empty());

        let unchanged = Action::Save {
            student_id: "A1".to_string(),
            state: state.clone(),
        };
        assert!(matches!(
            apply(&state, &unchanged, || at(9), || "x".to_string()),
            Cow::Borrowed(_)
        ));
    }
}
