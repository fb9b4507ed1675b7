//! Row checks applied before anything is written.

use api_types::{expense::ExpenseFields, income::IncomeFields, settings::SettingsFields};
use chrono::Datelike;

use crate::ServerError;

fn amount(field: &str, value: f64) -> Result<(), ServerError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ServerError::Validation(format!(
            "{field} must be a non-negative number"
        )));
    }
    Ok(())
}

pub fn expense(fields: &ExpenseFields) -> Result<(), ServerError> {
    if fields.name.trim().is_empty() {
        return Err(ServerError::Validation("name must not be empty".to_string()));
    }
    amount("cost", fields.cost)?;
    amount("monthly_base", fields.monthly_base)?;
    amount("yearly_base", fields.yearly_base)?;
    amount("monthly_converted", fields.monthly_converted)?;
    amount("yearly_converted", fields.yearly_converted)?;
    if i32::try_from(fields.order).is_err() {
        return Err(ServerError::Validation("order is out of range".to_string()));
    }
    Ok(())
}

pub fn income(fields: &IncomeFields) -> Result<(), ServerError> {
    expense(&fields.base)?;
    amount("gross_amount", fields.gross_amount)?;
    amount("paid_amount", fields.paid_amount)?;
    amount("paid_converted", fields.paid_converted)?;
    if fields.year != fields.date.year() {
        return Err(ServerError::Validation(format!(
            "year {} does not match date {}",
            fields.year, fields.date
        )));
    }
    Ok(())
}

pub fn settings(fields: &SettingsFields) -> Result<(), ServerError> {
    if !fields.conversion_rate.is_finite() || fields.conversion_rate <= 0.0 {
        return Err(ServerError::Validation(
            "conversion_rate must be a positive number".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use api_types::expense::Billing;
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn blank_name_is_rejected() {
        let fields = ExpenseFields::new("   ", 10.0, Billing::Monthly);
        assert!(matches!(expense(&fields), Err(ServerError::Validation(_))));
    }

    #[test]
    fn negative_or_nan_cost_is_rejected() {
        let negative = ExpenseFields::new("Gym", -1.0, Billing::Monthly);
        assert!(expense(&negative).is_err());

        let mut nan = ExpenseFields::new("Gym", 1.0, Billing::Monthly);
        nan.cost = f64::NAN;
        assert!(expense(&nan).is_err());
    }

    #[test]
    fn income_year_must_match_date() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut fields = IncomeFields::new("Invoice", date, 100.0);
        assert!(income(&fields).is_ok());

        fields.year = 2023;
        assert!(matches!(income(&fields), Err(ServerError::Validation(_))));
    }

    #[test]
    fn zero_conversion_rate_is_rejected() {
        let fields = SettingsFields {
            conversion_rate: 0.0,
            ..SettingsFields::default()
        };
        assert!(settings(&fields).is_err());
        assert!(settings(&SettingsFields::default()).is_ok());
    }
}
