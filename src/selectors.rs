//! Selector catalog: structural locators keyed by inferred semantic role.
//!
//! A derived view over the [`ElementRecord`]s attached to HTML chunks,
//! consumed by the script-generation collaborator when it emits locator
//! expressions. Built once per rebuild; stale after re-ingestion and
//! rebuilt alongside the vector index.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::ElementRecord;

/// Locator specificity classes, most specific first. The derived `Ord`
/// gives the catalog its ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SelectorKind {
    Id,
    Name,
    Class,
    Attribute,
    TagText,
}

impl std::fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SelectorKind::Id => "id",
            SelectorKind::Name => "name",
            SelectorKind::Class => "class",
            SelectorKind::Attribute => "attribute",
            SelectorKind::TagText => "tag-text",
        };
        f.write_str(label)
    }
}

/// A structural locator with the element context it came from. Several
/// role hints may resolve to the same locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorEntry {
    pub locator: String,
    pub kind: SelectorKind,
    pub tag: String,
}

struct CatalogEntry {
    entry: SelectorEntry,
    /// Role tokens derived from attributes and nearby text.
    tokens: BTreeSet<String>,
}

/// Catalog of selectors for one knowledge-base build.
#[derive(Default)]
pub struct SelectorCatalog {
    entries: Vec<CatalogEntry>,
}

impl SelectorCatalog {
    /// Build the catalog from structural metadata. Duplicate locators
    /// (the same element seen in several overlapping chunks, or repeated
    /// classes) are merged, pooling their role tokens.
    pub fn build(elements: &[ElementRecord]) -> Self {
        let mut merged: BTreeMap<(SelectorKind, String), (String, BTreeSet<String>)> =
            BTreeMap::new();

        for element in elements {
            let tokens = role_tokens(element);
            let mut add = |kind: SelectorKind, locator: String| {
                let slot = merged
                    .entry((kind, locator))
                    .or_insert_with(|| (element.tag.clone(), BTreeSet::new()));
                slot.1.extend(tokens.iter().cloned());
            };

            if let Some(id) = &element.id {
                add(SelectorKind::Id, format!("#{}", id));
            }
            if let Some(name) = &element.name {
                add(SelectorKind::Name, format!("[name='{}']", name));
            }
            for class in &element.classes {
                add(SelectorKind::Class, format!(".{}", class));
            }
            if let Some(test) = &element.test_attr {
                add(SelectorKind::Attribute, format!("[data-test='{}']", test));
            }
            if !element.text.is_empty() {
                add(
                    SelectorKind::TagText,
                    format!("//{}[contains(., \"{}\")]", element.tag, element.text),
                );
            }
        }

        let entries = merged
            .into_iter()
            .map(|((kind, locator), (tag, tokens))| CatalogEntry {
                entry: SelectorEntry { locator, kind, tag },
                tokens,
            })
            .collect();

        Self { entries }
    }

    /// Selectors relevant to a role hint, most-specific first: id-based
    /// outrank name-based, then class, then attribute, then tag+text
    /// heuristics. Within a class, higher token overlap first, then
    /// ascending locator for determinism.
    pub fn selectors_for(&self, role_hint: &str) -> Vec<SelectorEntry> {
        let hint = tokenize(role_hint);
        if hint.is_empty() {
            return Vec::new();
        }

        let mut matched: Vec<(usize, &CatalogEntry)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let overlap = entry.tokens.intersection(&hint).count();
                (overlap > 0).then_some((overlap, entry))
            })
            .collect();

        matched.sort_by(|(score_a, a), (score_b, b)| {
            a.entry
                .kind
                .cmp(&b.entry.kind)
                .then(score_b.cmp(score_a))
                .then(a.entry.locator.cmp(&b.entry.locator))
        });

        matched.into_iter().map(|(_, e)| e.entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn role_tokens(element: &ElementRecord) -> BTreeSet<String> {
    let mut tokens = tokenize(&element.tag);
    if let Some(id) = &element.id {
        tokens.extend(tokenize(id));
    }
    if let Some(name) = &element.name {
        tokens.extend(tokenize(name));
    }
    for class in &element.classes {
        tokens.extend(tokenize(class));
    }
    if let Some(test) = &element.test_attr {
        tokens.extend(tokenize(test));
    }
    tokens.extend(tokenize(&element.text));
    tokens
}

/// Lowercased alphanumeric runs, with common UI abbreviations folded to
/// their long forms so "btn" and "button" meet in the middle.
fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| {
            let lower = t.to_lowercase();
            match lower.as_str() {
                "btn" => "button".to_string(),
                "pwd" => "password".to_string(),
                "qty" => "quantity".to_string(),
                "msg" => "message".to_string(),
                _ => lower,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(
        tag: &str,
        id: Option<&str>,
        name: Option<&str>,
        classes: &[&str],
        test_attr: Option<&str>,
        text: &str,
    ) -> ElementRecord {
        ElementRecord {
            tag: tag.to_string(),
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            test_attr: test_attr.map(str::to_string),
            text: text.to_string(),
            offset: 0,
        }
    }

    #[test]
    fn id_locator_outranks_class() {
        let catalog = SelectorCatalog::build(&[element(
            "button",
            Some("pay-now-btn"),
            None,
            &["btn-green"],
            None,
            "Pay now",
        )]);

        let entries = catalog.selectors_for("pay now button");
        assert!(!entries.is_empty());
        assert_eq!(entries[0].locator, "#pay-now-btn");
        assert_eq!(entries[0].kind, SelectorKind::Id);
        let class_pos = entries
            .iter()
            .position(|e| e.locator == ".btn-green")
            .unwrap();
        assert!(class_pos > 0);
    }

    #[test]
    fn name_outranks_class_and_attribute() {
        let catalog = SelectorCatalog::build(&[element(
            "input",
            None,
            Some("coupon_code"),
            &["coupon-field"],
            Some("coupon-input"),
            "",
        )]);

        let entries = catalog.selectors_for("coupon code");
        let kinds: Vec<SelectorKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![SelectorKind::Name, SelectorKind::Class, SelectorKind::Attribute]
        );
    }

    #[test]
    fn unrelated_hint_matches_nothing() {
        let catalog = SelectorCatalog::build(&[element(
            "button",
            Some("pay-now-btn"),
            None,
            &[],
            None,
            "Pay now",
        )]);
        assert!(catalog.selectors_for("delete account link").is_empty());
    }

    #[test]
    fn empty_hint_matches_nothing() {
        let catalog = SelectorCatalog::build(&[element("button", Some("x-y"), None, &[], None, "")]);
        assert!(catalog.selectors_for("").is_empty());
        assert!(catalog.selectors_for("!!!").is_empty());
    }

    #[test]
    fn duplicate_elements_merge_to_one_locator() {
        // The same element observed in two overlapping chunks.
        let one = element("button", Some("pay-now-btn"), None, &[], None, "Pay now");
        let catalog = SelectorCatalog::build(&[one.clone(), one]);
        assert_eq!(catalog.len(), 2); // #pay-now-btn and the tag-text heuristic
        let entries = catalog.selectors_for("pay");
        assert_eq!(
            entries.iter().filter(|e| e.locator == "#pay-now-btn").count(),
            1
        );
    }

    #[test]
    fn abbreviation_folding_bridges_btn_and_button() {
        let catalog = SelectorCatalog::build(&[element(
            "div",
            None,
            None,
            &["checkout-btn"],
            None,
            "",
        )]);
        let entries = catalog.selectors_for("checkout button");
        assert_eq!(entries[0].locator, ".checkout-btn");
    }

    #[test]
    fn ties_within_a_kind_order_by_locator() {
        let catalog = SelectorCatalog::build(&[
            element("button", Some("pay-b"), None, &[], None, ""),
            element("button", Some("pay-a"), None, &[], None, ""),
        ]);
        let entries = catalog.selectors_for("pay");
        assert_eq!(entries[0].locator, "#pay-a");
        assert_eq!(entries[1].locator, "#pay-b");
    }
}
