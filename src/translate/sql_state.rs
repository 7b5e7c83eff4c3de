use crate::core::{DataAccessError, SqlError};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    BadSqlGrammar,
    DuplicateKey,
    DataIntegrityViolation,
    DataAccessResourceFailure,
    TransientDataAccessResource,
    CannotAcquireLock,
    DeadlockLoser,
    CannotSerializeTransaction,
}

impl Category {
    fn into_error(self, message: String, source: SqlError) -> DataAccessError {
        match self {
            Category::BadSqlGrammar => DataAccessError::BadSqlGrammar { message, source },
            Category::DuplicateKey => DataAccessError::DuplicateKey { message, source },
            Category::DataIntegrityViolation => {
                DataAccessError::DataIntegrityViolation { message, source }
            }
            Category::DataAccessResourceFailure => {
                DataAccessError::DataAccessResourceFailure { message, source }
            }
            Category::TransientDataAccessResource => {
                DataAccessError::TransientDataAccessResource { message, source }
            }
            Category::CannotAcquireLock => DataAccessError::CannotAcquireLock { message, source },
            Category::DeadlockLoser => DataAccessError::DeadlockLoser { message, source },
            Category::CannotSerializeTransaction => {
                DataAccessError::CannotSerializeTransaction { message, source }
            }
        }
    }

    /// Classification by the two-character SQL state class
    fn from_state_class(state: &str) -> Option<Category> {
        let class = state.get(..2)?;
        match class {
            "07" | "21" | "2A" | "37" | "42" | "65" => Some(Category::BadSqlGrammar),
            "01" | "02" | "22" | "23" | "27" | "44" => Some(Category::DataIntegrityViolation),
            "08" | "53" | "54" | "57" | "58" => Some(Category::DataAccessResourceFailure),
            "JW" | "JZ" | "S1" => Some(Category::TransientDataAccessResource),
            "40" | "61" => Some(Category::CannotSerializeTransaction),
            _ => None,
        }
    }
}

/// Vendor error-code table for one database product.
///
/// Codes are matched against the SQL state for products that report
/// meaningful states (PostgreSQL), and against the vendor error code
/// otherwise. Anything the table doesn't know falls back to the SQL state
/// class.
#[derive(Debug, Clone)]
pub struct SqlErrorCodes {
    database: &'static str,
    use_sql_state: bool,
    codes: HashMap<String, Category>,
}

impl SqlErrorCodes {
    pub fn for_product(product_name: Option<&str>) -> Self {
        let product = product_name.unwrap_or_default().to_ascii_lowercase();
        if product.contains("postgres") {
            Self::postgres()
        } else if product.contains("mysql") || product.contains("mariadb") {
            Self::mysql()
        } else if product.contains("h2") {
            Self::h2()
        } else {
            Self::generic()
        }
    }

    /// Table with no vendor codes: SQL state classes only
    pub fn generic() -> Self {
        Self {
            database: "generic",
            use_sql_state: true,
            codes: HashMap::new(),
        }
    }

    fn postgres() -> Self {
        let mut codes = HashMap::new();
        insert(&mut codes, Category::BadSqlGrammar, &["03000", "42000", "42601", "42602", "42622", "42804", "42P01"]);
        insert(&mut codes, Category::DuplicateKey, &["21000", "23505"]);
        insert(&mut codes, Category::DataIntegrityViolation, &["23000", "23502", "23503", "23514"]);
        insert(&mut codes, Category::DataAccessResourceFailure, &["53000", "53100", "53200", "53300"]);
        insert(&mut codes, Category::CannotAcquireLock, &["55P03"]);
        insert(&mut codes, Category::CannotSerializeTransaction, &["40001"]);
        insert(&mut codes, Category::DeadlockLoser, &["40P01"]);
        Self {
            database: "postgresql",
            use_sql_state: true,
            codes,
        }
    }

    fn mysql() -> Self {
        let mut codes = HashMap::new();
        insert(&mut codes, Category::BadSqlGrammar, &["1054", "1064", "1146"]);
        insert(&mut codes, Category::DuplicateKey, &["1062"]);
        insert(
            &mut codes,
            Category::DataIntegrityViolation,
            &["630", "839", "840", "893", "1169", "1215", "1216", "1217", "1364", "1451", "1452", "1557"],
        );
        insert(&mut codes, Category::DataAccessResourceFailure, &["1"]);
        insert(&mut codes, Category::CannotAcquireLock, &["1205", "3572"]);
        insert(&mut codes, Category::DeadlockLoser, &["1213"]);
        Self {
            database: "mysql",
            use_sql_state: false,
            codes,
        }
    }

    fn h2() -> Self {
        let mut codes = HashMap::new();
        insert(
            &mut codes,
            Category::BadSqlGrammar,
            &["42000", "42001", "42101", "42102", "42111", "42112", "42121", "42122", "42132"],
        );
        insert(&mut codes, Category::DuplicateKey, &["23001", "23505"]);
        insert(
            &mut codes,
            Category::DataIntegrityViolation,
            &["22001", "22003", "22012", "22018", "22025", "23000", "23002", "23003", "23502", "23503", "23506", "23507", "23513"],
        );
        insert(&mut codes, Category::DataAccessResourceFailure, &["90046", "90100", "90117", "90121", "90126"]);
        insert(&mut codes, Category::CannotAcquireLock, &["50200"]);
        Self {
            database: "h2",
            use_sql_state: false,
            codes,
        }
    }

    pub fn database(&self) -> &str {
        self.database
    }

    pub fn translate(&self, message: &str, error: SqlError) -> DataAccessError {
        let code = if self.use_sql_state {
            error.sql_state.clone()
        } else {
            error.error_code.map(|code| code.to_string())
        };

        let category = code
            .and_then(|code| self.codes.get(&code).copied())
            .or_else(|| error.sql_state.as_deref().and_then(Category::from_state_class));

        match category {
            Some(category) => category.into_error(message.to_string(), error),
            None => DataAccessError::UncategorizedSql {
                message: message.to_string(),
                source: error,
            },
        }
    }
}

fn insert(codes: &mut HashMap<String, Category>, category: Category, values: &[&str]) {
    for value in values {
        codes.insert((*value).to_string(), category);
    }
}
