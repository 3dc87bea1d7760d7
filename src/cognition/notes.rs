//! Per-turn advisory notes and the COGNITIVE STATE block.

/// One optional note per advisory subsystem.
///
/// `None` means the subsystem added nothing. Whether it stayed silent or
/// failed is recorded separately in [`StageFailure`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvisoryNotes {
    pub ethics: Option<String>,
    pub context_shift: Option<String>,
    pub integration: Option<String>,
    pub memory: Option<String>,
    pub symbolic: Option<String>,
    pub causal: Option<String>,
}

impl AdvisoryNotes {
    /// Notes in block order, with their labels.
    pub fn labelled(&self) -> [(&'static str, Option<&str>); 6] {
        [
            ("Ethics", self.ethics.as_deref()),
            ("Context shift", self.context_shift.as_deref()),
            ("Integration", self.integration.as_deref()),
            ("Memory", self.memory.as_deref()),
            ("Symbolic", self.symbolic.as_deref()),
            ("Causal", self.causal.as_deref()),
        ]
    }

    pub fn count(&self) -> usize {
        self.labelled().iter().filter(|(_, n)| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The COGNITIVE STATE block, or `None` when there are no notes.
    pub fn render_block(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut block = String::from("COGNITIVE STATE:");
        for (label, note) in self.labelled() {
            if let Some(note) = note {
                block.push_str(&format!("\n- {label}: {note}"));
            }
        }
        Some(block)
    }
}

/// An advisory stage that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_uses_fixed_order() {
        let notes = AdvisoryNotes {
            causal: Some("c".into()),
            ethics: Some("e".into()),
            memory: Some("m".into()),
            ..Default::default()
        };
        assert_eq!(
            notes.render_block().unwrap(),
            "COGNITIVE STATE:\n- Ethics: e\n- Memory: m\n- Causal: c"
        );
        assert_eq!(notes.count(), 3);
    }

    #[test]
    fn no_notes_no_block() {
        assert!(AdvisoryNotes::default().render_block().is_none());
    }
}
