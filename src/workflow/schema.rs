//! Create/edit form definitions, one per entity kind.

use once_cell::sync::Lazy;
use regex::Regex;

use super::form::FormStep;
use super::upload::AcceptPolicy;
use super::validation::Rule;
use crate::models::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Number,
    Date,
    Files(AcceptPolicy),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub input: InputKind,
    pub rules: Vec<Rule>,
    pub step: FormStep,
}

impl FieldSpec {
    fn new(name: &'static str, label: &'static str, input: InputKind) -> Self {
        let rules = match input {
            InputKind::Number => vec![Rule::Numeric],
            InputKind::Date => vec![date_rule()],
            _ => Vec::new(),
        };
        Self {
            name,
            label,
            input,
            rules,
            step: FormStep::Information,
        }
    }

    fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, InputKind::Text)
    }

    fn number(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, InputKind::Number)
    }

    fn date(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, InputKind::Date)
    }

    fn files(name: &'static str, label: &'static str, policy: AcceptPolicy) -> Self {
        Self::new(name, label, InputKind::Files(policy))
    }

    fn required(mut self) -> Self {
        self.rules.insert(0, Rule::Required);
        self
    }

    fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    fn on(mut self, step: FormStep) -> Self {
        self.step = step;
        self
    }

    pub fn is_required(&self) -> bool {
        self.rules.iter().any(|r| matches!(r, Rule::Required))
    }
}

static DATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").unwrap());

static PLATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[a-z]{3}\s?[0-9]{4}$").unwrap());

fn date_rule() -> Rule {
    Rule::Pattern {
        regex: DATE_REGEX.clone(),
        message: "Use the format YYYY-MM-DD".into(),
    }
}

#[derive(Debug, Clone)]
pub struct FormSchema {
    pub kind: EntityKind,
    pub fields: Vec<FieldSpec>,
    /// Adds a Documents step between Information and Review.
    pub documents_step: bool,
    /// Finish on a generated-ID step (the backend reference is the new
    /// record's public id) instead of a plain confirmation.
    pub generated_id: bool,
    /// Ask the parent to refresh whenever the dialog closes, submitted or not.
    pub refresh_on_close: bool,
}

impl FormSchema {
    fn new(kind: EntityKind, fields: Vec<FieldSpec>) -> Self {
        Self {
            kind,
            fields,
            documents_step: false,
            generated_id: false,
            refresh_on_close: false,
        }
    }

    pub fn steps(&self) -> Vec<FormStep> {
        let mut steps = vec![FormStep::Information];
        if self.documents_step {
            steps.push(FormStep::Documents);
        }
        steps.push(FormStep::Review);
        steps.push(if self.generated_id {
            FormStep::GeneratedId
        } else {
            FormStep::Confirmation
        });
        steps
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields_on(&self, step: FormStep) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(move |f| f.step == step)
    }

    pub fn for_kind(kind: EntityKind) -> FormSchema {
        match kind {
            EntityKind::Miner => {
                let mut s = FormSchema::new(
                    kind,
                    vec![
                        FieldSpec::text("name", "First name").required(),
                        FieldSpec::text("surname", "Surname").required(),
                        FieldSpec::text("nationalId", "National ID")
                            .required()
                            .rule(Rule::NationalId),
                        FieldSpec::text("phoneNumber", "Phone number")
                            .required()
                            .rule(Rule::Phone),
                        FieldSpec::text("email", "Email").rule(Rule::Email),
                        FieldSpec::text("position", "Position").required(),
                        FieldSpec::files("documents", "Supporting documents", AcceptPolicy::DOCUMENTS)
                            .on(FormStep::Documents),
                    ],
                );
                s.documents_step = true;
                s
            }
            EntityKind::Company => {
                let mut s = FormSchema::new(
                    kind,
                    vec![
                        FieldSpec::text("companyName", "Company name").required(),
                        FieldSpec::text("registrationNumber", "Registration number").required(),
                        FieldSpec::text("address", "Address").required(),
                        FieldSpec::text("email", "Email").required().rule(Rule::Email),
                        FieldSpec::text("contactPhone", "Contact phone")
                            .required()
                            .rule(Rule::Phone),
                        FieldSpec::files("documents", "Company documents", AcceptPolicy::DOCUMENTS)
                            .required()
                            .on(FormStep::Documents),
                    ],
                );
                s.documents_step = true;
                s
            }
            EntityKind::Section => FormSchema::new(
                kind,
                vec![
                    FieldSpec::text("sectionName", "Section name").required(),
                    FieldSpec::number("numberOfShafts", "Number of shafts")
                        .required()
                        .rule(Rule::Range { min: 1.0, max: 100.0 }),
                    FieldSpec::text("shaftNumbers", "Shaft numbers").required(),
                ],
            ),
            EntityKind::OreReceival => {
                let mut s = FormSchema::new(
                    kind,
                    vec![
                        FieldSpec::text("shaftNumbers", "Shaft").required(),
                        FieldSpec::text("oreType", "Ore type").required(),
                        FieldSpec::number("amountOrGrams", "Amount (grams)").required(),
                        FieldSpec::number("weight", "Weight (tonnes)"),
                        FieldSpec::date("date", "Date received").required(),
                        FieldSpec::files("images", "Load photos", AcceptPolicy::IMAGES),
                    ],
                );
                s.generated_id = true;
                s
            }
            EntityKind::SecurityDispatch => FormSchema::new(
                kind,
                vec![
                    FieldSpec::text("oreId", "Ore ID").required(),
                    FieldSpec::text("vehicleRegistration", "Vehicle").required(),
                    FieldSpec::text("driverName", "Driver").required(),
                    FieldSpec::text("sealNumber", "Seal number").required(),
                    FieldSpec::text("destination", "Destination").required(),
                ],
            ),
            EntityKind::Transport => {
                let mut s = FormSchema::new(
                    kind,
                    vec![
                        FieldSpec::text("oreId", "Ore ID").required(),
                        FieldSpec::text("vehicleRegistration", "Vehicle").required(),
                        FieldSpec::text("driverName", "Driver").required(),
                        FieldSpec::text("destination", "Destination").required(),
                        FieldSpec::date("departureDate", "Departure date"),
                    ],
                );
                s.refresh_on_close = true;
                s
            }
            EntityKind::Driver => FormSchema::new(
                kind,
                vec![
                    FieldSpec::text("name", "Full name").required(),
                    FieldSpec::text("phoneNumber", "Phone number")
                        .required()
                        .rule(Rule::Phone),
                    FieldSpec::text("licenseNumber", "Licence number").required(),
                    FieldSpec::text("position", "Position"),
                    FieldSpec::files("licenseImage", "Licence photo", AcceptPolicy::SINGLE_IMAGE)
                        .required(),
                ],
            ),
            EntityKind::Vehicle => FormSchema::new(
                kind,
                vec![
                    FieldSpec::text("registrationNumber", "Registration number")
                        .required()
                        .rule(Rule::Pattern {
                            regex: PLATE_REGEX.clone(),
                            message: "Use the format ABC 1234".into(),
                        }),
                    FieldSpec::text("make", "Make").required(),
                    FieldSpec::text("vehicleType", "Vehicle type").required(),
                    FieldSpec::number("capacity", "Capacity (tonnes)")
                        .rule(Rule::Range { min: 0.0, max: 100.0 }),
                    FieldSpec::files("vehiclePhoto", "Vehicle photo", AcceptPolicy::SINGLE_IMAGE)
                        .required(),
                ],
            ),
            EntityKind::TrainingRecord => FormSchema::new(
                kind,
                vec![
                    FieldSpec::text("trainingType", "Training").required(),
                    FieldSpec::text("trainer", "Trainer").required(),
                    FieldSpec::date("scheduledDate", "Date").required(),
                    FieldSpec::text("location", "Location").required(),
                    FieldSpec::number("numberOfAttendees", "Attendees")
                        .rule(Rule::Range { min: 1.0, max: 500.0 }),
                ],
            ),
            EntityKind::Tax => FormSchema::new(
                kind,
                vec![
                    FieldSpec::text("taxType", "Tax type").required(),
                    FieldSpec::number("taxRate", "Rate (%)")
                        .required()
                        .rule(Rule::Range { min: 0.0, max: 100.0 }),
                    FieldSpec::text("location", "Location").required(),
                    FieldSpec::text("description", "Description"),
                ],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_schema() {
        for kind in EntityKind::ALL {
            let schema = FormSchema::for_kind(kind);
            assert_eq!(schema.kind, kind);
            assert!(schema.fields.iter().any(|f| f.is_required()), "{}", kind);
        }
    }

    #[test]
    fn test_step_variants() {
        assert_eq!(
            FormSchema::for_kind(EntityKind::Tax).steps(),
            vec![FormStep::Information, FormStep::Review, FormStep::Confirmation]
        );
        assert_eq!(
            FormSchema::for_kind(EntityKind::Company).steps(),
            vec![
                FormStep::Information,
                FormStep::Documents,
                FormStep::Review,
                FormStep::Confirmation
            ]
        );
        assert_eq!(
            FormSchema::for_kind(EntityKind::OreReceival).steps().last(),
            Some(&FormStep::GeneratedId)
        );
    }

    #[test]
    fn test_documents_only_on_documents_step() {
        let schema = FormSchema::for_kind(EntityKind::Company);
        let names: Vec<&str> = schema.fields_on(FormStep::Documents).map(|f| f.name).collect();
        assert_eq!(names, vec!["documents"]);
    }

    #[test]
    fn test_number_fields_are_numeric_checked() {
        let schema = FormSchema::for_kind(EntityKind::OreReceival);
        let amount = schema.field("amountOrGrams").unwrap();
        assert!(matches!(amount.rules[0], Rule::Required));
        assert!(matches!(amount.rules[1], Rule::Numeric));
    }
}
