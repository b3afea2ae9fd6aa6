use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod auth {
    use super::*;

    /// Response body of the `oauth/token` password-grant exchange.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TokenResponse {
        pub access_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub token_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub expires_in: Option<u64>,
    }
}

pub mod user {
    use super::*;

    /// Current user profile.
    ///
    /// `password` is write-only: the server never echoes it back, and it is
    /// omitted from JSON unless a change is being submitted.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct User {
        pub username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub password: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub version: Option<i64>,
    }
}

pub mod account {
    use super::*;

    /// An account as mirrored from the server.
    ///
    /// `id` and `version` are server-generated; a new account is submitted
    /// with both unset. Balances are signed integer minor units.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Account {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub id: Option<i64>,
        pub name: String,
        /// ISO 4217 currency code.
        pub currency: String,
        pub balance_minor: i64,
        pub include_in_total: bool,
        pub show_in_list: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub version: Option<i64>,
    }
}

pub mod currency {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CurrencyInfo {
        pub code: String,
        pub display_name: String,
    }
}

pub mod configuration {
    use super::*;

    /// One admin settings entry; the configuration endpoint exchanges a flat
    /// array of these.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ConfigurationVariable {
        pub name: String,
        pub value: String,
    }
}

pub mod transaction {
    use super::*;

    /// Discriminant of a transaction.
    ///
    /// `Unknown` absorbs any unrecognized wire value so a newer server cannot
    /// break deserialization; such transactions never pass balance
    /// validation.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub enum TransactionType {
        #[default]
        #[serde(rename = "EXPENSEINCOME")]
        ExpenseIncome,
        #[serde(rename = "TRANSFER")]
        Transfer,
        #[serde(other)]
        Unknown,
    }

    /// One leg of a transaction: a signed amount applied to an account.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Component {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub version: Option<i64>,
        pub account_id: i64,
        pub amount_minor: i64,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Transaction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub version: Option<i64>,
        #[serde(default)]
        pub description: String,
        pub date: NaiveDate,
        #[serde(default)]
        pub tags: Vec<String>,
        #[serde(rename = "type")]
        pub kind: TransactionType,
        #[serde(default)]
        pub components: Vec<Component>,
    }

    impl Transaction {
        pub fn is_expense_income(&self) -> bool {
            self.kind == TransactionType::ExpenseIncome
        }

        pub fn is_transfer(&self) -> bool {
            self.kind == TransactionType::Transfer
        }
    }
}
