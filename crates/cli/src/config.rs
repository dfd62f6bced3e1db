//! Process configuration, read from the environment at startup.

use anyhow::Context;

use daftar_infra::RuleCodes;

/// Everything the binary needs from the environment. Constructed once in
/// `main` and passed down; nothing else reads env vars.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Chart codes of the posting rule control accounts.
    pub rule_codes: RuleCodes,
    /// Chart code of the equity account absorbing audit-fix residuals.
    pub equity_code: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let defaults = RuleCodes::default();
        let rule_codes = RuleCodes {
            accounts_receivable: env_or(
                "DAFTAR_ACCOUNTS_RECEIVABLE",
                defaults.accounts_receivable,
            ),
            sales_revenue: env_or("DAFTAR_SALES_REVENUE", defaults.sales_revenue),
            tax_payable: env_or("DAFTAR_TAX_PAYABLE", defaults.tax_payable),
            cash: env_or("DAFTAR_CASH", defaults.cash),
            accounts_payable: env_or("DAFTAR_ACCOUNTS_PAYABLE", defaults.accounts_payable),
        };
        let equity_code = env_or("DAFTAR_EQUITY", "3.1".to_string());
        Ok(Self {
            database_url,
            rule_codes,
            equity_code,
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}
