use crate::domain::medication::{Medication, MedicationLog, MedicationView};

/// Merges a medication with the day's log, if one exists for it.
pub fn reconcile(medication: Medication, logs_for_day: &[MedicationLog]) -> MedicationView {
    let log = logs_for_day.iter().find(|log| log.medication_id == medication.id);
    MedicationView {
        taken: log.is_some(),
        taken_at: log.map(|log| log.taken_at),
        marked_by: log.and_then(|log| log.marked_by.clone()),
        medication,
    }
}

/// Reconciles a whole snapshot against one day's logs.
pub fn reconcile_all(medications: Vec<Medication>, logs_for_day: &[MedicationLog]) -> Vec<MedicationView> {
    medications.into_iter().map(|med| reconcile(med, logs_for_day)).collect()
}

/// Taken state of one (medication, day) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakenState {
    NotTaken,
    Taken,
}

/// Storage effect a user action requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CreateLog,
    DeleteLog,
    Noop,
}

impl TakenState {
    pub fn of(log: Option<&MedicationLog>) -> Self {
        if log.is_some() { TakenState::Taken } else { TakenState::NotTaken }
    }

    /// Marking an already-taken dose is satisfied as-is.
    pub fn mark(self) -> Transition {
        match self {
            TakenState::NotTaken => Transition::CreateLog,
            TakenState::Taken => Transition::Noop,
        }
    }

    /// Unmarking a dose with no log is satisfied as-is.
    pub fn unmark(self) -> Transition {
        match self {
            TakenState::Taken => Transition::DeleteLog,
            TakenState::NotTaken => Transition::Noop,
        }
    }
}
