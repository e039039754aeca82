//! Multi-step create/edit dialog.
//!
//! Steps run `Information → [Documents] → Review → Confirmation`. `next`
//! validates the fields of the current step and refuses to advance on any
//! failure; `back` never discards input. Submitting from Review calls the
//! backend and, on success, lands on the final step with the backend's
//! reference. Closing the dialog at any point resets it.

use serde_json::{Number, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::schema::{FieldSpec, FormSchema, InputKind};
use super::upload::Attachment;
use super::validation::{first_failure, FieldErrors};
use crate::cache::QueryCache;
use crate::client::{Backend, Payload};
use crate::errors::{BackofficeError, Result};
use crate::models::{Record, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormStep {
    Information,
    Documents,
    Review,
    Confirmation,
    GeneratedId,
}

impl FormStep {
    pub fn title(&self) -> &'static str {
        match self {
            FormStep::Information => "Information",
            FormStep::Documents => "Documents",
            FormStep::Review => "Review",
            FormStep::Confirmation => "Confirmation",
            FormStep::GeneratedId => "Generated ID",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, FormStep::Confirmation | FormStep::GeneratedId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(RecordId),
}

/// One line of the read-only recap shown on Review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLine {
    pub label: &'static str,
    pub value: String,
}

/// What closing the dialog asks of the parent view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseEffect {
    pub refresh_parent: bool,
}

pub struct FormFlow {
    schema: FormSchema,
    steps: Vec<FormStep>,
    mode: FormMode,
    open: bool,
    current: usize,
    values: BTreeMap<String, String>,
    /// Fields the edited record already had a value for.
    prefilled: BTreeSet<String>,
    files: BTreeMap<String, Vec<Attachment>>,
    errors: FieldErrors,
    submit_error: Option<String>,
    submitting: bool,
    reference: Option<String>,
}

impl FormFlow {
    pub fn new(schema: FormSchema) -> Self {
        let steps = schema.steps();
        Self {
            schema,
            steps,
            mode: FormMode::Create,
            open: false,
            current: 0,
            values: BTreeMap::new(),
            prefilled: BTreeSet::new(),
            files: BTreeMap::new(),
            errors: FieldErrors::new(),
            submit_error: None,
            submitting: false,
            reference: None,
        }
    }

    pub fn open_create(&mut self) {
        self.reset();
        self.mode = FormMode::Create;
        self.open = true;
    }

    /// Open pre-filled from an existing record. File fields start empty.
    pub fn open_edit(&mut self, record: &Record) {
        self.reset();
        for field in &self.schema.fields {
            if matches!(field.input, InputKind::Files(_)) {
                continue;
            }
            if let Some(text) = record.field_text(field.name) {
                if !text.trim().is_empty() {
                    self.prefilled.insert(field.name.to_string());
                }
                self.values.insert(field.name.to_string(), text);
            }
        }
        self.mode = FormMode::Edit(record.id.clone());
        self.open = true;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn steps(&self) -> &[FormStep] {
        &self.steps
    }

    pub fn step(&self) -> FormStep {
        self.steps[self.current]
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn attachments(&self, field: &str) -> &[Attachment] {
        self.files.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn can_submit(&self) -> bool {
        self.open && self.step() == FormStep::Review && !self.submitting
    }

    /// Set a text value. Editing a field clears its error marker.
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field.to_string(), value.into());
        self.errors.remove(field);
    }

    /// Replace the selection of a file field. A selection the field's
    /// policy refuses is not kept and the field is marked.
    pub fn attach(&mut self, field: &str, files: Vec<Attachment>) -> Result<()> {
        let policy = match self.schema.field(field).map(|f| f.input) {
            Some(InputKind::Files(policy)) => policy,
            _ => {
                return Err(anyhow::anyhow!("{} is not a file field", field).into());
            }
        };
        if let Err(e) = policy.check(&files) {
            self.errors.insert(field, e.user_message());
            return Err(e);
        }
        self.files.insert(field.to_string(), files);
        self.errors.remove(field);
        Ok(())
    }

    fn validate_field(&self, field: &FieldSpec) -> Option<String> {
        match field.input {
            InputKind::Files(policy) => {
                let files = self.attachments(field.name);
                if files.is_empty() {
                    return field.is_required().then(|| "This field is required".to_string());
                }
                policy.check(files).err().map(|e| e.user_message())
            }
            _ => first_failure(&field.rules, self.value(field.name).unwrap_or("")),
        }
    }

    fn validate_step(&self, step: FormStep) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for field in self.schema.fields_on(step) {
            if let Some(msg) = self.validate_field(field) {
                errors.insert(field.name, msg);
            }
        }
        errors
    }

    /// Advance one step after validating the current one. Review and the
    /// final step don't advance through `next`.
    pub fn next(&mut self) -> Result<FormStep> {
        if !self.open {
            return Err(BackofficeError::NotOpen);
        }
        let step = self.step();
        if matches!(step, FormStep::Review) || step.is_final() {
            return Ok(step);
        }

        let errors = self.validate_step(step);
        if !errors.is_empty() {
            tracing::debug!(step = step.title(), invalid = %errors, "form step blocked");
            self.errors = errors.clone();
            return Err(BackofficeError::Validation(errors));
        }
        self.errors.clear();
        self.current += 1;
        Ok(self.step())
    }

    pub fn back(&mut self) -> FormStep {
        let step = self.step();
        if self.current > 0 && !step.is_final() {
            self.current -= 1;
            self.submit_error = None;
        }
        self.step()
    }

    pub fn review(&self) -> Vec<ReviewLine> {
        self.schema
            .fields
            .iter()
            .map(|field| {
                let value = match field.input {
                    InputKind::Files(_) => self
                        .attachments(field.name)
                        .iter()
                        .map(|a| a.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    _ => self.value(field.name).unwrap_or("").trim().to_string(),
                };
                ReviewLine {
                    label: field.label,
                    value: if value.is_empty() { "-".to_string() } else { value },
                }
            })
            .collect()
    }

    /// The submission body. Blank optional fields are left out, except in
    /// edit mode where a field the record had and the user cleared is sent
    /// as `null`. Numbers go as JSON numbers, files as data URLs (a single
    /// string when the field takes exactly one file).
    pub fn payload(&self) -> Payload {
        let mut payload = Payload::new();
        for field in &self.schema.fields {
            match field.input {
                InputKind::Files(policy) => {
                    let files = self.attachments(field.name);
                    if files.is_empty() {
                        continue;
                    }
                    let value = if policy.exact_count == Some(1) {
                        Value::String(files[0].data_url.clone())
                    } else {
                        Value::Array(
                            files
                                .iter()
                                .map(|a| Value::String(a.data_url.clone()))
                                .collect(),
                        )
                    };
                    payload.insert(field.name.to_string(), value);
                }
                InputKind::Number | InputKind::Text | InputKind::Date => {
                    let value = match self.value(field.name).map(str::trim).filter(|v| !v.is_empty()) {
                        Some(v) if field.input == InputKind::Number => number_value(v),
                        Some(v) => Value::String(v.to_string()),
                        None if self.cleared(field.name) => Value::Null,
                        None => continue,
                    };
                    payload.insert(field.name.to_string(), value);
                }
            }
        }
        payload
    }

    fn cleared(&self, field: &str) -> bool {
        matches!(self.mode, FormMode::Edit(_)) && self.prefilled.contains(field)
    }

    /// Submit from Review. All fields are re-validated before anything is sent.
    pub async fn submit(&mut self, backend: &dyn Backend, cache: &QueryCache) -> Result<Option<String>> {
        if !self.open {
            return Err(BackofficeError::NotOpen);
        }
        if self.submitting {
            return Err(BackofficeError::Busy);
        }
        if self.step() != FormStep::Review {
            return Err(anyhow::anyhow!("submit is only available on the review step").into());
        }

        let mut all = FieldErrors::new();
        for field in &self.schema.fields {
            if let Some(msg) = self.validate_field(field) {
                all.insert(field.name, msg);
            }
        }
        if !all.is_empty() {
            self.errors = all.clone();
            self.submit_error = Some(BackofficeError::Validation(all.clone()).user_message());
            return Err(BackofficeError::Validation(all));
        }

        let kind = self.schema.kind;
        let payload = self.payload();
        self.submit_error = None;
        let result = {
            let _submitting = Submitting::start(&mut self.submitting);
            match &self.mode {
                FormMode::Create => backend.create(kind, &payload).await,
                FormMode::Edit(id) => backend.update(kind, id, &payload).await,
            }
            .and_then(|receipt| receipt.into_result())
        };

        match result {
            Ok(receipt) => {
                let reference = receipt.reference.or_else(|| match &self.mode {
                    FormMode::Edit(id) => Some(id.to_string()),
                    FormMode::Create => None,
                });
                tracing::info!(kind = %kind, reference = ?reference, "form submitted");
                cache.invalidate(kind);
                self.reference = reference.clone();
                self.current = self.steps.len() - 1;
                Ok(reference)
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "form submission failed");
                self.submit_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Close and reset. The parent refreshes after a successful submission,
    /// or always when the schema asks for it.
    pub fn close(&mut self) -> CloseEffect {
        let submitted = self.reference.is_some() || self.step().is_final();
        let refresh_parent = self.open && (submitted || self.schema.refresh_on_close);
        self.reset();
        CloseEffect { refresh_parent }
    }

    fn reset(&mut self) {
        self.open = false;
        self.current = 0;
        self.values.clear();
        self.prefilled.clear();
        self.files.clear();
        self.errors.clear();
        self.submit_error = None;
        self.submitting = false;
        self.reference = None;
        self.mode = FormMode::Create;
    }
}

/// Raises the submitting flag and lowers it again on drop, so a cancelled
/// submit doesn't leave the form stuck.
struct Submitting<'a>(&'a mut bool);

impl<'a> Submitting<'a> {
    fn start(flag: &'a mut bool) -> Self {
        *flag = true;
        Submitting(flag)
    }
}

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

fn number_value(v: &str) -> Value {
    if let Ok(n) = v.parse::<i64>() {
        return Value::Number(n.into());
    }
    v.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryBackend;
    use crate::models::{EntityKind, ReviewStatus};
    use std::time::Duration;

    fn cache() -> QueryCache {
        QueryCache::new(Duration::from_secs(60))
    }

    fn ore_form() -> FormFlow {
        let mut form = FormFlow::new(FormSchema::for_kind(EntityKind::OreReceival));
        form.open_create();
        form
    }

    fn fill_ore(form: &mut FormFlow) {
        form.set("shaftNumbers", "S-3");
        form.set("oreType", "Gold ore");
        form.set("amountOrGrams", "1250");
        form.set("weight", "18.4");
        form.set("date", "2024-05-06");
    }

    #[test]
    fn test_blank_required_numeric_blocks_information() {
        let mut form = ore_form();
        fill_ore(&mut form);
        form.set("amountOrGrams", "");

        let err = form.next().unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
        assert_eq!(form.step(), FormStep::Information);
        assert_eq!(form.errors().get("amountOrGrams"), Some("This field is required"));
        assert_eq!(form.errors().len(), 1);
    }

    #[test]
    fn test_advancing_and_back_keep_input() {
        let mut form = ore_form();
        fill_ore(&mut form);
        assert_eq!(form.next().unwrap(), FormStep::Review);
        assert_eq!(form.back(), FormStep::Information);
        assert_eq!(form.value("amountOrGrams"), Some("1250"));
        assert_eq!(form.next().unwrap(), FormStep::Review);
    }

    #[test]
    fn test_editing_field_clears_its_error() {
        let mut form = ore_form();
        assert!(form.next().is_err());
        assert!(form.errors().get("oreType").is_some());
        form.set("oreType", "Quartz");
        assert!(form.errors().get("oreType").is_none());
    }

    #[test]
    fn test_review_recap() {
        let mut form = ore_form();
        fill_ore(&mut form);
        form.next().unwrap();
        let lines = form.review();
        let amount = lines.iter().find(|l| l.label == "Amount (grams)").unwrap();
        assert_eq!(amount.value, "1250");
        let photos = lines.iter().find(|l| l.label == "Load photos").unwrap();
        assert_eq!(photos.value, "-");
    }

    #[test]
    fn test_payload_types() {
        let mut form = ore_form();
        fill_ore(&mut form);
        let payload = form.payload();
        assert_eq!(payload["amountOrGrams"], serde_json::json!(1250));
        assert_eq!(payload["weight"], serde_json::json!(18.4));
        assert_eq!(payload["date"], serde_json::json!("2024-05-06"));
        assert!(!payload.contains_key("images"));
    }

    #[test]
    fn test_single_file_field_sends_string() {
        let mut form = FormFlow::new(FormSchema::for_kind(EntityKind::Driver));
        form.open_create();
        let png = Attachment::from_bytes("licence.png", None, b"\x89PNG\r\n\x1a\nrest");
        form.attach("licenseImage", vec![png]).unwrap();
        let payload = form.payload();
        assert!(payload["licenseImage"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_refused_attachment_marks_field() {
        let mut form = FormFlow::new(FormSchema::for_kind(EntityKind::Driver));
        form.open_create();
        let pdf = Attachment::from_bytes("licence.pdf", None, b"%PDF-1.7");
        assert!(form.attach("licenseImage", vec![pdf]).is_err());
        assert!(form.errors().get("licenseImage").is_some());
        assert!(form.attachments("licenseImage").is_empty());
    }

    #[tokio::test]
    async fn test_submit_advances_to_generated_id() {
        let backend = MemoryBackend::new();
        let cache = cache();
        let mut form = ore_form();
        fill_ore(&mut form);
        form.next().unwrap();

        let reference = form.submit(&backend, &cache).await.unwrap();
        assert!(reference.is_some());
        assert_eq!(form.step(), FormStep::GeneratedId);
        assert_eq!(form.reference(), reference.as_deref());
        assert_eq!(backend.count(EntityKind::OreReceival), 1);
        assert_eq!(cache.generation(EntityKind::OreReceival), 1);

        let created = backend
            .get(EntityKind::OreReceival, &RecordId::from(reference.unwrap()))
            .unwrap();
        assert_eq!(created.status, Some(ReviewStatus::Pending));
        assert!(form.close().refresh_parent);
    }

    #[tokio::test]
    async fn test_submit_failure_stays_on_review() {
        let backend = MemoryBackend::new();
        backend.fail_next("create", "Shaft S-3 is not registered");
        let mut form = ore_form();
        fill_ore(&mut form);
        form.next().unwrap();

        assert!(form.submit(&backend, &cache()).await.is_err());
        assert_eq!(form.step(), FormStep::Review);
        assert_eq!(form.submit_error(), Some("Shaft S-3 is not registered"));
        assert!(form.can_submit());
    }

    #[tokio::test]
    async fn test_submit_refused_outside_review() {
        let backend = MemoryBackend::new();
        let mut form = ore_form();
        fill_ore(&mut form);
        assert!(form.submit(&backend, &cache()).await.is_err());
        assert_eq!(backend.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_edit_mode_updates() {
        let backend = MemoryBackend::new();
        let existing = Record::new("3")
            .with_field("taxType", "Royalty")
            .with_field("taxRate", 5)
            .with_field("location", "Bindura");
        backend.insert(EntityKind::Tax, existing.clone());

        let mut form = FormFlow::new(FormSchema::for_kind(EntityKind::Tax));
        form.open_edit(&existing);
        assert_eq!(form.value("taxRate"), Some("5"));
        form.set("taxRate", "7.5");
        form.next().unwrap();
        let reference = form.submit(&backend, &cache()).await.unwrap();
        assert_eq!(reference.as_deref(), Some("3"));

        let calls = backend.calls();
        assert_eq!(calls[0].op, "update");
        let updated = backend.get(EntityKind::Tax, &RecordId::from("3")).unwrap();
        assert_eq!(updated.field("taxRate"), Some(&serde_json::json!(7.5)));
    }

    #[tokio::test]
    async fn test_edit_clearing_optional_field_sends_null() {
        let backend = MemoryBackend::new();
        let existing = Record::new("3")
            .with_field("taxType", "Royalty")
            .with_field("taxRate", 5)
            .with_field("location", "Bindura")
            .with_field("description", "old text");
        backend.insert(EntityKind::Tax, existing.clone());

        let mut form = FormFlow::new(FormSchema::for_kind(EntityKind::Tax));
        form.open_edit(&existing);
        form.set("description", "");
        form.next().unwrap();
        let line = form.review().into_iter().find(|l| l.label == "Description").unwrap();
        assert_eq!(line.value, "-");
        assert_eq!(form.payload().get("description"), Some(&Value::Null));

        form.submit(&backend, &cache()).await.unwrap();
        let updated = backend.get(EntityKind::Tax, &RecordId::from("3")).unwrap();
        assert_eq!(updated.field_text("description"), None);
        assert_eq!(updated.field_text("location").as_deref(), Some("Bindura"));
    }

    #[test]
    fn test_create_leaves_blank_optional_out() {
        let mut form = FormFlow::new(FormSchema::for_kind(EntityKind::Tax));
        form.open_create();
        form.set("description", "");
        assert!(!form.payload().contains_key("description"));
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl Backend for Stalled {
        async fn fetch_list(&self, _kind: EntityKind) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }
        async fn fetch_detail(&self, _kind: EntityKind, id: &RecordId) -> Result<Record> {
            Err(BackofficeError::NotFound(id.to_string()))
        }
        async fn create(&self, _kind: EntityKind, _payload: &Payload) -> Result<crate::client::MutationReceipt> {
            std::future::pending().await
        }
        async fn update(
            &self,
            _kind: EntityKind,
            _id: &RecordId,
            _payload: &Payload,
        ) -> Result<crate::client::MutationReceipt> {
            std::future::pending().await
        }
        async fn transition_status(
            &self,
            _kind: EntityKind,
            _id: &RecordId,
            _outcome: crate::models::Outcome,
            _reason: Option<&str>,
        ) -> Result<crate::client::MutationReceipt> {
            std::future::pending().await
        }
        async fn delete(&self, _kind: EntityKind, _id: &RecordId) -> Result<crate::client::MutationReceipt> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_submit_can_be_retried() {
        let mut form = ore_form();
        fill_ore(&mut form);
        form.next().unwrap();

        let cache = cache();
        let timed_out = tokio::time::timeout(Duration::from_millis(20), form.submit(&Stalled, &cache)).await;
        assert!(timed_out.is_err());
        assert!(!form.is_submitting());
        assert!(form.can_submit());
        assert_eq!(form.step(), FormStep::Review);
    }

    #[test]
    fn test_close_resets_without_refresh() {
        let mut form = ore_form();
        fill_ore(&mut form);
        form.next().unwrap();
        let effect = form.close();
        assert!(!effect.refresh_parent);
        assert!(!form.is_open());
        form.open_create();
        assert_eq!(form.step(), FormStep::Information);
        assert_eq!(form.value("oreType"), None);
    }

    #[test]
    fn test_refresh_on_close_schema() {
        let mut form = FormFlow::new(FormSchema::for_kind(EntityKind::Transport));
        form.open_create();
        assert!(form.close().refresh_parent);
        // a closed dialog has nothing to refresh
        assert!(!form.close().refresh_parent);
    }
}
