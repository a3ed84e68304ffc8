//! crates/coaching_core/src/wizard.rs
//!
//! A linear multi-step form. Each step owns a subset of the form's fields and
//! only those are re-validated when leaving it, so an unvisited step can never
//! block progress retroactively.

use serde::Serialize;

/// A validation failure on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

type Validator<F> = Box<dyn Fn(&F) -> Vec<FieldError> + Send + Sync>;

/// One page of a wizard.
pub struct Step<F> {
    title: String,
    fields: Vec<String>,
    validate: Validator<F>,
}

impl<F: 'static> Step<F> {
    pub fn new<V>(title: impl Into<String>, fields: &[&str], validate: V) -> Self
    where
        V: Fn(&F) -> Vec<FieldError> + Send + Sync + 'static,
    {
        Self {
            title: title.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            validate: Box::new(validate),
        }
    }

    /// A step with nothing to validate, such as a review page.
    pub fn review(title: impl Into<String>) -> Self {
        Self::new(title, &[], |_: &F| Vec::new())
    }
}

impl<F> Step<F> {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Errors for the fields this step owns. Errors on other fields are dropped.
    pub fn validate(&self, form: &F) -> Vec<FieldError> {
        (self.validate)(form)
            .into_iter()
            .filter(|e| self.fields.iter().any(|f| *f == e.field))
            .collect()
    }
}

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Moved(usize),
    Blocked(Vec<FieldError>),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Submission is only possible from the last step")]
    NotOnLastStep,
    #[error("A submission is already in progress")]
    InFlight,
    #[error("Please fix the highlighted fields")]
    Invalid(Vec<FieldError>),
    #[error("{0}")]
    PreCheck(String),
}

pub struct Wizard<F> {
    steps: Vec<Step<F>>,
    form: F,
    initial_form: F,
    index: usize,
    initial_index: usize,
    errors: Vec<FieldError>,
    submitting: bool,
    completed: bool,
}

impl<F: Clone> Wizard<F> {
    pub fn new(steps: Vec<Step<F>>, form: F) -> Self {
        Self::starting_at(steps, form, 0)
    }

    /// Starts on `index`, e.g. 1 when an entity was preselected by the caller.
    pub fn starting_at(steps: Vec<Step<F>>, form: F, index: usize) -> Self {
        let index = index.min(steps.len().saturating_sub(1));
        Self {
            steps,
            initial_form: form.clone(),
            form,
            index,
            initial_index: index,
            errors: Vec::new(),
            submitting: false,
            completed: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based step number for display.
    pub fn step_number(&self) -> usize {
        self.index + 1
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn current_step(&self) -> Option<&Step<F>> {
        self.steps.get(self.index)
    }

    pub fn is_last_step(&self) -> bool {
        self.index + 1 >= self.steps.len()
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut F {
        &mut self.form
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn step_errors(&self, index: usize) -> Vec<FieldError> {
        self.steps
            .get(index)
            .map(|s| s.validate(&self.form))
            .unwrap_or_default()
    }

    /// Advances if the current step validates. On the last step use `begin_submit`.
    pub fn next(&mut self) -> Transition {
        if self.is_last_step() {
            return Transition::Unchanged;
        }
        let errors = self.step_errors(self.index);
        if !errors.is_empty() {
            self.errors = errors.clone();
            return Transition::Blocked(errors);
        }
        self.errors.clear();
        self.index += 1;
        Transition::Moved(self.index)
    }

    pub fn prev(&mut self) -> Transition {
        if self.index == 0 {
            return Transition::Unchanged;
        }
        self.errors.clear();
        self.index -= 1;
        Transition::Moved(self.index)
    }

    /// Backwards jumps always succeed; forward jumps need every earlier step valid.
    pub fn jump_to(&mut self, target: usize) -> Transition {
        if target >= self.steps.len() || target == self.index {
            return Transition::Unchanged;
        }
        if target > self.index {
            for i in 0..target {
                let errors = self.step_errors(i);
                if !errors.is_empty() {
                    self.errors = errors.clone();
                    return Transition::Blocked(errors);
                }
            }
        }
        self.errors.clear();
        self.index = target;
        Transition::Moved(self.index)
    }

    /// Moves forward step by step until the last step or the first invalid one,
    /// then validates the last step as well.
    pub fn fast_forward(&mut self) -> Result<(), Vec<FieldError>> {
        while !self.is_last_step() {
            if let Transition::Blocked(errors) = self.next() {
                return Err(errors);
            }
        }
        let errors = self.step_errors(self.index);
        if !errors.is_empty() {
            self.errors = errors.clone();
            return Err(errors);
        }
        Ok(())
    }

    pub fn can_submit(&self) -> bool {
        self.is_last_step() && !self.submitting && self.step_errors(self.index).is_empty()
    }

    /// Marks a submission as in flight. `precheck` runs synchronously against the
    /// form, e.g. a credit sufficiency check, and its message is shown as-is.
    pub fn begin_submit<P>(&mut self, precheck: P) -> Result<&F, SubmitError>
    where
        P: FnOnce(&F) -> Result<(), String>,
    {
        if !self.is_last_step() {
            return Err(SubmitError::NotOnLastStep);
        }
        if self.submitting {
            return Err(SubmitError::InFlight);
        }
        let errors = self.step_errors(self.index);
        if !errors.is_empty() {
            self.errors = errors.clone();
            return Err(SubmitError::Invalid(errors));
        }
        precheck(&self.form).map_err(SubmitError::PreCheck)?;
        self.errors.clear();
        self.submitting = true;
        Ok(&self.form)
    }

    pub fn finish_submit(&mut self, succeeded: bool) {
        self.submitting = false;
        if succeeded {
            self.completed = true;
        }
    }

    /// Back to the state the wizard was opened with.
    pub fn reset(&mut self) {
        self.form = self.initial_form.clone();
        self.index = self.initial_index;
        self.errors.clear();
        self.submitting = false;
        self.completed = false;
    }
}
