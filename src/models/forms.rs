//! Form validation rules for dashboard input

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::article::ArticleForm;
use super::beneficiary::BeneficiaryForm;
use super::donor::DonorForm;
use super::loan::{LoanForm, LoanUpdate, PartialReturnRequest};

const MAX_NAME_LENGTH: usize = 100;
const MAX_NOTES_LENGTH: usize = 1000;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(r"^[0-9+().\-\s]{6,20}$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Accumulates field errors for one form
#[derive(Debug, Default)]
struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    fn fail(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError::new(field, message));
    }

    fn required_name(&mut self, field: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.fail(field, "Ce champ est requis");
        } else if value.chars().count() > MAX_NAME_LENGTH {
            self.fail(field, "100 caractères maximum");
        }
    }

    fn optional_email(&mut self, field: &str, value: &Option<String>) {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            if !EMAIL_REGEX.is_match(v) {
                self.fail(field, "Adresse email invalide");
            }
        }
    }

    fn optional_phone(&mut self, field: &str, value: &Option<String>) {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            if !PHONE_REGEX.is_match(v) {
                self.fail(field, "Numéro de téléphone invalide");
            }
        }
    }

    fn notes(&mut self, value: &Option<String>) {
        if value
            .as_deref()
            .map(|v| v.chars().count() > MAX_NOTES_LENGTH)
            .unwrap_or(false)
        {
            self.fail("notes", "1000 caractères maximum");
        }
    }

    fn return_date(&mut self, loan_date: Option<NaiveDate>, expected: Option<NaiveDate>) {
        if let (Some(start), Some(expected)) = (loan_date, expected) {
            if expected < start {
                self.fail(
                    "expected_return_date",
                    "La date de retour doit être postérieure à la date de prêt",
                );
            }
        }
    }

    fn finish(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

impl BeneficiaryForm {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut checks = Checks::default();
        checks.required_name("first_name", &self.first_name);
        checks.required_name("last_name", &self.last_name);
        checks.optional_email("email", &self.email);
        checks.optional_phone("phone", &self.phone);
        checks.finish()
    }
}

impl DonorForm {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut checks = Checks::default();
        checks.required_name("name", &self.name);
        checks.optional_email("email", &self.email);
        checks.optional_phone("phone", &self.phone);
        checks.finish()
    }
}

impl ArticleForm {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut checks = Checks::default();
        checks.required_name("name", &self.name);
        checks.finish()
    }
}

impl LoanForm {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut checks = Checks::default();

        if self.beneficiary_id.is_none() {
            checks.fail("beneficiary_id", "Veuillez sélectionner un bénéficiaire");
        }

        if self.article_ids.is_empty() {
            checks.fail("article_ids", "Veuillez sélectionner au moins un article");
        } else {
            let unique: HashSet<_> = self.article_ids.iter().collect();
            if unique.len() != self.article_ids.len() {
                checks.fail("article_ids", "Un article ne peut figurer qu'une fois");
            }
        }

        checks.return_date(Some(self.loan_date), self.expected_return_date);
        checks.notes(&self.notes);
        checks.finish()
    }
}

impl LoanUpdate {
    /// `loan_date` is the stored start date of the loan being edited
    pub fn validate(&self, loan_date: NaiveDate) -> Result<(), Vec<FieldError>> {
        let mut checks = Checks::default();
        checks.return_date(Some(loan_date), self.expected_return_date.flatten());
        checks.notes(&self.notes.clone().flatten());
        checks.finish()
    }
}

impl PartialReturnRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut checks = Checks::default();

        if self.articles.is_empty() {
            checks.fail("articles", "Veuillez sélectionner au moins un article à retourner");
        } else {
            let unique: HashSet<_> = self.articles.iter().map(|a| a.article_id).collect();
            if unique.len() != self.articles.len() {
                checks.fail("articles", "Un article ne peut figurer qu'une fois");
            }
        }

        checks.finish()
    }
}
