use std::collections::HashSet;

use paychain_core::Transaction;

/// Drop records whose `reference_id` was already seen, keeping the first
/// occurrence and the input order. Records without a reference are always
/// kept since nothing identifies them as repeats.
pub fn deduplicate(transactions: Vec<Transaction>) -> Vec<Transaction> {
    let mut seen: HashSet<String> = HashSet::new();
    transactions
        .into_iter()
        .filter(|tx| match &tx.reference_id {
            None => true,
            Some(reference) => seen.insert(reference.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use paychain_core::{Money, TxType};

    fn tx(reference: Option<&str>, narration: &str) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let mut tx = Transaction::new(date, Money::from_cents(-1000), "CNY", "Assets:WeChat", TxType::Expense);
        tx.reference_id = reference.map(str::to_string);
        tx.narration = narration.to_string();
        tx
    }

    fn narrations(txs: &[Transaction]) -> Vec<&str> {
        txs.iter().map(|t| t.narration.as_str()).collect()
    }

    #[test]
    fn keeps_first_occurrence_in_order() {
        let input = vec![
            tx(Some("A"), "a"),
            tx(Some("B"), "b"),
            tx(Some("A"), "a-again"),
            tx(Some("C"), "c"),
        ];
        assert_eq!(narrations(&deduplicate(input)), vec!["a", "b", "c"]);
    }

    #[test]
    fn records_without_reference_are_never_removed() {
        let input = vec![tx(None, "x"), tx(None, "x"), tx(Some("A"), "a"), tx(None, "x")];
        assert_eq!(deduplicate(input).len(), 4);
    }

    #[test]
    fn empty_reference_is_still_a_reference() {
        let input = vec![tx(Some(""), "first"), tx(Some(""), "second")];
        assert_eq!(narrations(&deduplicate(input)), vec!["first"]);
    }

    #[test]
    fn empty_input() {
        assert!(deduplicate(Vec::new()).is_empty());
    }
}
