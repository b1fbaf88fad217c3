//! Structured bank-statement data returned by the extraction client.
//!
//! Lives only for the duration of one request; nothing here is persisted.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankStatement {
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub account_holder: Option<String>,
    #[serde(default)]
    pub starting_date: Option<String>,
    #[serde(default)]
    pub closing_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub starting_balance: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub closing_balance: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub bank_code: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub debit: Decimal,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub credit: Decimal,
}

/// Caller-supplied bookkeeping references stamped onto every transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub document_number: String,
    pub bank_code: String,
    pub account_number: String,
}

impl BankStatement {
    /// Overwrite each transaction's ledger references with the caller's values.
    pub fn stamp(&mut self, ledger: &LedgerMetadata) {
        for tx in &mut self.transactions {
            tx.document_number = Some(ledger.document_number.clone());
            tx.bank_code = Some(ledger.bank_code.clone());
            tx.account_number = Some(ledger.account_number.clone());
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(Decimal),
    Text(String),
}

/// Numbers or numeric strings; `null`, `"None"` and other non-numeric text are absent.
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawAmount>::deserialize(deserializer)? {
        Some(RawAmount::Number(n)) => Some(n),
        Some(RawAmount::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_decimal(deserializer)?.unwrap_or_default())
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn missing_optional_fields_are_absent() {
        let statement: BankStatement =
            serde_json::from_str(r#"{"bank_name": "Banque Atlantique"}"#).unwrap();

        assert_eq!(statement.bank_name.as_deref(), Some("Banque Atlantique"));
        assert!(statement.account_holder.is_none());
        assert!(statement.starting_balance.is_none());
        assert!(statement.transactions.is_empty());
    }

    #[test]
    fn amounts_keep_exact_decimal_values() {
        let statement: BankStatement = serde_json::from_str(
            r#"{
                "starting_balance": 1234.56,
                "closing_balance": "99.10",
                "transactions": [
                    {"date": "02/03/2024", "description": "Virement", "debit": 0.1, "credit": 0.2}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(statement.starting_balance, Some(Decimal::from_str("1234.56").unwrap()));
        assert_eq!(statement.closing_balance, Some(Decimal::from_str("99.10").unwrap()));
        let tx = &statement.transactions[0];
        assert_eq!(tx.debit + tx.credit, Decimal::from_str("0.3").unwrap());
    }

    #[test]
    fn null_and_placeholder_values_degrade_gracefully() {
        let statement: BankStatement = serde_json::from_str(
            r#"{
                "starting_balance": "None",
                "closing_balance": null,
                "transactions": [{"description": null, "debit": null, "credit": "None"}]
            }"#,
        )
        .unwrap();

        assert!(statement.starting_balance.is_none());
        assert!(statement.closing_balance.is_none());
        let tx = &statement.transactions[0];
        assert_eq!(tx.description, "");
        assert_eq!(tx.debit, Decimal::ZERO);
        assert_eq!(tx.credit, Decimal::ZERO);
    }

    #[test]
    fn stamp_overwrites_every_transaction() {
        let mut statement = BankStatement {
            transactions: vec![
                Transaction {
                    document_number: Some("from-model".to_string()),
                    ..Default::default()
                },
                Transaction::default(),
            ],
            ..Default::default()
        };
        let ledger = LedgerMetadata {
            document_number: "100".to_string(),
            bank_code: "512000".to_string(),
            account_number: "FR76-0001".to_string(),
        };

        statement.stamp(&ledger);

        for tx in &statement.transactions {
            assert_eq!(tx.document_number.as_deref(), Some("100"));
            assert_eq!(tx.bank_code.as_deref(), Some("512000"));
            assert_eq!(tx.account_number.as_deref(), Some("FR76-0001"));
        }
    }
}
