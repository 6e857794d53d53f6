// twsbatch/src/fin_statements.rs
// Parser for the gateway's coded financial-statement documents.

use chrono::NaiveDate;
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::base::GatewayError;

/// Which period section of the document to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodMode {
  Annual,
  Quarterly,
}

impl PeriodMode {
  fn section_tag(&self) -> &'static [u8] {
    match self {
      PeriodMode::Annual => b"AnnualPeriods",
      PeriodMode::Quarterly => b"InterimPeriods",
    }
  }

  /// Regulatory filing types accepted for this mode. Ad hoc variants
  /// (press releases, preliminary reports) are skipped.
  fn accepts_source(&self, source: &str) -> bool {
    match self {
      PeriodMode::Annual => matches!(source, "10-K" | "ARS" | "20-F"),
      PeriodMode::Quarterly => matches!(source, "10-Q" | "6-K"),
    }
  }
}

// The chart-of-accounts table. Each line item in a statement carries a
// short COA code; this maps the codes the surrounding analytics consume
// to stable semantic names. The table is best-effort: gateway documents
// grow codes over time, and unresolved ones are skipped with a warning.
macro_rules! statement_fields {
  ( $( $variant:ident => ($code:literal, $name:literal), )+ ) => {
    /// A semantic line-item field resolved from a COA code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub enum StatementField {
      $( $variant, )+
    }

    impl StatementField {
      pub fn from_coa_code(code: &str) -> Option<Self> {
        match code {
          $( $code => Some(StatementField::$variant), )+
          _ => None,
        }
      }

      pub fn coa_code(&self) -> &'static str {
        match self {
          $( StatementField::$variant => $code, )+
        }
      }

      pub fn name(&self) -> &'static str {
        match self {
          $( StatementField::$variant => $name, )+
        }
      }
    }
  };
}

statement_fields! {
  // Income statement
  Revenue => ("SREV", "revenue"),
  OtherRevenue => ("SORE", "other_revenue"),
  TotalRevenue => ("RTLR", "total_revenue"),
  CostOfRevenue => ("SCOR", "cost_of_revenue"),
  GrossProfit => ("SGRP", "gross_profit"),
  SellingGeneralAdminExpenses => ("SSGA", "selling_general_admin_expenses"),
  ResearchAndDevelopment => ("ERAD", "research_and_development"),
  DepreciationAmortization => ("SDPR", "depreciation_amortization"),
  InterestExpense => ("SINN", "interest_expense"),
  UnusualExpense => ("SUIE", "unusual_expense"),
  OtherOperatingExpenses => ("SOOE", "other_operating_expenses"),
  TotalOperatingExpense => ("ETOE", "total_operating_expense"),
  OperatingIncome => ("SOPI", "operating_income"),
  InterestIncomeNetNonOperating => ("SNIN", "interest_income_net_non_operating"),
  GainOnSaleOfAssets => ("NGLA", "gain_on_sale_of_assets"),
  OtherNet => ("SONT", "other_net"),
  NetIncomeBeforeTaxes => ("EIBT", "net_income_before_taxes"),
  ProvisionForIncomeTaxes => ("TTAX", "provision_for_income_taxes"),
  NetIncomeAfterTaxes => ("TIAT", "net_income_after_taxes"),
  MinorityInterest => ("CMIN", "minority_interest"),
  EquityInAffiliates => ("CEIA", "equity_in_affiliates"),
  GaapAdjustment => ("CGAP", "gaap_adjustment"),
  NetIncomeBeforeExtraItems => ("NIBX", "net_income_before_extra_items"),
  TotalExtraordinaryItems => ("STXI", "total_extraordinary_items"),
  NetIncome => ("NINC", "net_income"),
  TotalAdjustmentsToNetIncome => ("SANI", "total_adjustments_to_net_income"),
  IncomeAvailableExclExtraordinary => ("CIAC", "income_available_to_common_excl_extraordinary"),
  IncomeAvailableInclExtraordinary => ("XNIC", "income_available_to_common_incl_extraordinary"),
  DilutionAdjustment => ("SDAJ", "dilution_adjustment"),
  DilutedNetIncome => ("SDNI", "diluted_net_income"),
  DilutedWeightedAverageShares => ("SDWS", "diluted_weighted_average_shares"),
  DilutedEpsExclExtraordinary => ("SDBF", "diluted_eps_excluding_extraordinary_items"),
  DpsCommonStockPrimaryIssue => ("DDPS1", "dps_common_stock_primary_issue"),
  DilutedNormalizedEps => ("VDES", "diluted_normalized_eps"),
  TotalPremiumsEarned => ("SPRE", "total_premiums_earned"),
  NetInvestmentIncome => ("RNII", "net_investment_income"),
  RealizedUnrealizedGains => ("RRGL", "realized_unrealized_gains"),
  LossesBenefitsAdjustments => ("SLBA", "losses_benefits_adjustments"),
  AmortizationOfPolicyAcquisitionCosts => ("EPAC", "amortization_of_policy_acquisition_costs"),
  NonInterestExpenseBank => ("SNIE", "non_interest_expense_bank"),
  NonInterestIncomeBank => ("SNII", "non_interest_income_bank"),
  NetInterestIncomeAfterLoanLossProvision => ("SIAP", "net_interest_income_after_loan_loss_provision"),
  LoanLossProvision => ("ELLP", "loan_loss_provision"),
  NetInterestIncome => ("ENII", "net_interest_income"),
  TotalInterestExpense => ("STIE", "total_interest_expense"),
  InterestIncomeBank => ("SIIB", "interest_income_bank"),
  OperationsAndMaintenance => ("EDOE", "operations_and_maintenance"),
  FuelExpense => ("EFEX", "fuel_expense"),
  AllowanceForFundsUsedDuringConstruction => ("NAFC", "allowance_for_funds_used_during_construction"),
  // Balance sheet
  Cash => ("ACSH", "cash"),
  CashAndEquivalents => ("ACAE", "cash_and_equivalents"),
  ShortTermInvestments => ("ASTI", "short_term_investments"),
  CashAndShortTermInvestments => ("SCSI", "cash_and_short_term_investments"),
  AccountsReceivable => ("AACR", "accounts_receivable"),
  TotalReceivables => ("ATRC", "total_receivables"),
  TotalInventory => ("AITL", "total_inventory"),
  PrepaidExpenses => ("APPY", "prepaid_expenses"),
  OtherCurrentAssets => ("SOCA", "other_current_assets"),
  TotalCurrentAssets => ("ATCA", "total_current_assets"),
  PropertyPlantEquipmentGross => ("APTC", "property_plant_equipment_gross"),
  AccumulatedDepreciation => ("ADEP", "accumulated_depreciation"),
  PropertyPlantEquipmentNet => ("APPN", "property_plant_equipment_net"),
  Goodwill => ("AGWI", "goodwill"),
  Intangibles => ("AINT", "intangibles"),
  LongTermInvestments => ("SINV", "long_term_investments"),
  NoteReceivableLongTerm => ("ALTR", "note_receivable_long_term"),
  OtherLongTermAssets => ("SOLA", "other_long_term_assets"),
  OtherAssets => ("SOAT", "other_assets"),
  TotalAssets => ("ATOT", "total_assets"),
  AccountsPayable => ("LAPB", "accounts_payable"),
  PayableAccrued => ("LPBA", "payable_accrued"),
  AccruedExpenses => ("LAEX", "accrued_expenses"),
  NotesPayableShortTermDebt => ("LSTD", "notes_payable_short_term_debt"),
  CurrentPortionLongTermDebt => ("LCLD", "current_portion_long_term_debt_capital_leases"),
  OtherCurrentLiabilities => ("SOCL", "other_current_liabilities"),
  TotalCurrentLiabilities => ("LTCL", "total_current_liabilities"),
  LongTermDebt => ("LLTD", "long_term_debt"),
  CapitalLeaseObligations => ("LCLO", "capital_lease_obligations"),
  TotalLongTermDebt => ("LTTD", "total_long_term_debt"),
  TotalDebt => ("STLD", "total_debt"),
  DeferredIncomeTax => ("SBDT", "deferred_income_tax"),
  MinorityInterestBalance => ("LMIN", "minority_interest_balance"),
  OtherLiabilities => ("SLTL", "other_liabilities"),
  TotalLiabilities => ("LTLL", "total_liabilities"),
  RedeemablePreferredStock => ("SRPR", "redeemable_preferred_stock"),
  PreferredStockNonRedeemable => ("SPRS", "preferred_stock_non_redeemable"),
  CommonStock => ("SCMS", "common_stock"),
  AdditionalPaidInCapital => ("QPIC", "additional_paid_in_capital"),
  RetainedEarnings => ("QRED", "retained_earnings"),
  TreasuryStock => ("QTSC", "treasury_stock"),
  EsopDebtGuarantee => ("QEDG", "esop_debt_guarantee"),
  UnrealizedGain => ("QUGL", "unrealized_gain"),
  OtherEquity => ("SOTE", "other_equity"),
  TotalEquity => ("QTLE", "total_equity"),
  TotalLiabilitiesAndShareholdersEquity => ("QTEL", "total_liabilities_and_shareholders_equity"),
  TotalCommonSharesOutstanding => ("QTCO", "total_common_shares_outstanding"),
  TotalPreferredSharesOutstanding => ("QTPO", "total_preferred_shares_outstanding"),
  TangibleBookValuePerShare => ("STBP", "tangible_book_value_per_share"),
  InsuranceReceivables => ("APRE", "insurance_receivables"),
  DeferredPolicyAcquisitionCosts => ("ADPA", "deferred_policy_acquisition_costs"),
  PolicyLiabilities => ("SPOL", "policy_liabilities"),
  TotalShortTermBorrowings => ("LSTB", "total_short_term_borrowings"),
  OtherBearingLiabilities => ("SOBL", "other_bearing_liabilities"),
  TotalDeposits => ("LDBT", "total_deposits"),
  NetLoans => ("ANTL", "net_loans"),
  OtherEarningAssets => ("SOEA", "other_earning_assets"),
  CashAndDueFromBanks => ("ACDB", "cash_and_due_from_banks"),
  TotalUtilityPlant => ("SUPN", "total_utility_plant"),
  // Cash flow
  NetIncomeStartingLine => ("ONET", "net_income_starting_line"),
  DepreciationDepletion => ("SDED", "depreciation_depletion"),
  Amortization => ("SAMT", "amortization"),
  DeferredTaxes => ("OBDT", "deferred_taxes"),
  NonCashItems => ("SNCI", "non_cash_items"),
  ChangesInWorkingCapital => ("SOCF", "changes_in_working_capital"),
  CashFromOperatingActivities => ("OTLO", "cash_from_operating_activities"),
  CapitalExpenditures => ("SCEX", "capital_expenditures"),
  OtherInvestingCashFlowItems => ("SICF", "other_investing_cash_flow_items"),
  CashFromInvestingActivities => ("ITLI", "cash_from_investing_activities"),
  FinancingCashFlowItems => ("SFCF", "financing_cash_flow_items"),
  TotalCashDividendsPaid => ("FCDP", "total_cash_dividends_paid"),
  IssuanceOfStock => ("FPSS", "issuance_of_stock"),
  IssuanceOfDebt => ("FPRD", "issuance_of_debt"),
  CashFromFinancingActivities => ("FTLF", "cash_from_financing_activities"),
  ForeignExchangeEffects => ("SFEE", "foreign_exchange_effects"),
  NetChangeInCash => ("SNCC", "net_change_in_cash"),
  CashInterestPaid => ("SCIP", "cash_interest_paid"),
  CashTaxesPaid => ("SCTP", "cash_taxes_paid"),
  CashReceipts => ("OCRC", "cash_receipts"),
  CashPayments => ("OCPD", "cash_payments"),
}

/// One accepted fiscal period: its reported line items keyed by semantic
/// field. Sparse by nature; absent fields mean "not reported", never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialPeriod {
  pub end_date: Option<NaiveDate>,
  pub fiscal_year: Option<i32>,
  /// Filing type this period came from, e.g. "10-K".
  pub source: String,
  pub mode: PeriodMode,
  pub items: BTreeMap<StatementField, f64>,
}

impl FinancialPeriod {
  pub fn get(&self, field: StatementField) -> Option<f64> {
    self.items.get(&field).copied()
  }

  /// Dividends paid, defaulting to zero. Companies that pay none simply
  /// omit the line item, so here absence does mean zero.
  pub fn dividends_paid(&self) -> f64 {
    self.get(StatementField::TotalCashDividendsPaid).unwrap_or(0.0)
  }
}

/// The latest and previous periods of a parsed list, either of which may
/// be absent. A newly listed company with a single filing yields
/// `(Some(latest), None)`; callers treat the missing slot as unknown.
pub fn latest_and_previous(periods: &[FinancialPeriod]) -> (Option<&FinancialPeriod>, Option<&FinancialPeriod>) {
  (periods.first(), periods.get(1))
}

fn get_attr_value(e: &BytesStart, key: &[u8]) -> Result<Option<String>, GatewayError> {
  for attr_result in e.attributes() {
    let attr = attr_result
      .map_err(|err| GatewayError::ParseError(format!("XML attribute parsing error: {}", err)))?;
    if attr.key.as_ref() == key {
      let unescaped = attr
        .unescape_value()
        .map_err(|err| GatewayError::ParseError(format!("Attribute value unescape error: {}", err)))?;
      return Ok(Some(unescaped.as_ref().to_string()));
    }
  }
  Ok(None)
}

fn parse_optional_date(opt_str: Option<String>) -> Option<NaiveDate> {
  opt_str.as_deref().and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn parse_optional_i32(opt_str: Option<String>) -> Option<i32> {
  opt_str.as_deref().and_then(|s| s.parse::<i32>().ok())
}

/// Parses a raw financial-statement document into its accepted fiscal
/// periods, in document order (most recent first).
///
/// Only periods whose filing source matches the mode's accepted set are
/// returned. The list may be shorter than a caller hoped; that is data
/// scarcity, not a parse failure. Pure function of its inputs, so parsing
/// the same document twice yields identical results.
pub fn parse_financial_statements(
  xml_data: &str,
  mode: PeriodMode,
) -> Result<Vec<FinancialPeriod>, GatewayError> {
  let mut reader = Reader::from_str(xml_data);
  reader.config_mut().trim_text(true);
  let mut buf = Vec::new();

  let mut periods: Vec<FinancialPeriod> = Vec::new();
  let mut in_section = false;
  let mut current: Option<FinancialPeriod> = None;

  loop {
    match reader.read_event_into(&mut buf) {
      Ok(Event::Start(e)) => {
        match e.name().as_ref() {
          tag if tag == mode.section_tag() => in_section = true,
          b"FiscalPeriod" if in_section => {
            current = Some(FinancialPeriod {
              end_date: parse_optional_date(get_attr_value(&e, b"EndDate")?),
              fiscal_year: parse_optional_i32(get_attr_value(&e, b"FiscalYear")?),
              source: String::new(),
              mode,
              items: BTreeMap::new(),
            });
          }
          b"Source" if current.is_some() => {
            if let Ok(Event::Text(text_e)) = reader.read_event_into(&mut buf) {
              let source = text_e
                .decode()
                .map_err(|err| GatewayError::ParseError(err.to_string()))?
                .to_string();
              if let Some(period) = current.as_mut() {
                // A period's statements all cite the same filing.
                if period.source.is_empty() {
                  period.source = source;
                }
              }
            }
          }
          b"lineItem" if current.is_some() => {
            // Older documents use coaItem where newer ones use coaCode.
            let code = match get_attr_value(&e, b"coaCode")? {
              Some(c) => Some(c),
              None => get_attr_value(&e, b"coaItem")?,
            };
            let value = if let Ok(Event::Text(text_e)) = reader.read_event_into(&mut buf) {
              text_e
                .decode()
                .map_err(|err| GatewayError::ParseError(err.to_string()))?
                .parse::<f64>()
                .ok()
            } else {
              None
            };
            if let (Some(code), Some(value), Some(period)) = (code, value, current.as_mut()) {
              match StatementField::from_coa_code(&code) {
                Some(field) => {
                  period.items.insert(field, value);
                }
                None => warn!("Unresolved COA code '{}' in statement, skipping", code),
              }
            }
          }
          _ => {}
        }
      }
      Ok(Event::End(e)) => match e.name().as_ref() {
        tag if tag == mode.section_tag() => in_section = false,
        b"FiscalPeriod" if in_section => {
          if let Some(period) = current.take() {
            if mode.accepts_source(&period.source) {
              periods.push(period);
            } else {
              debug!(
                "Skipping period ending {:?} with unaccepted source '{}'",
                period.end_date, period.source
              );
            }
          }
        }
        _ => {}
      },
      Ok(Event::Eof) => break,
      Err(err) => {
        return Err(GatewayError::ParseError(format!(
          "XML parsing error in financial statements: {}",
          err
        )))
      }
      _ => (),
    }
    buf.clear();
  }
  Ok(periods)
}
