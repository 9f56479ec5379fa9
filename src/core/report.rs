/// Validation report: issues grouped per rule category, in catalog order.

use std::fmt;

use crate::core::rules::Rule;
use crate::core::validate::Issue;

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub rule: Rule,
    pub issues: Vec<Issue>,
}

impl Category {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub categories: Vec<Category>,
}

impl ValidationReport {
    /// Every catalog rule gets a category, passing ones included.
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let mut categories: Vec<Category> = Rule::catalog()
            .into_iter()
            .map(|rule| Category {
                rule,
                issues: Vec::new(),
            })
            .collect();
        for issue in issues {
            if let Some(category) = categories.iter_mut().find(|c| c.rule == issue.rule) {
                category.issues.push(issue);
            }
        }
        Self { categories }
    }

    pub fn is_clean(&self) -> bool {
        self.categories.iter().all(Category::passed)
    }

    pub fn issue_count(&self) -> usize {
        self.categories.iter().map(|c| c.issues.len()).sum()
    }

    pub fn failed_categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| !c.passed())
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.categories.iter().flat_map(|c| c.issues.iter())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for category in &self.categories {
            let status = if category.passed() { "PASS" } else { "FAIL" };
            writeln!(f, "[{status}] {}", category.rule)?;
            for issue in &category.issues {
                writeln!(f, "       {issue}")?;
            }
        }
        let failed = self.failed_categories().count();
        write!(
            f,
            "{} categories, {} failed, {} issues",
            self.categories.len(),
            failed,
            self.issue_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::RefField;
    use crate::core::validate::IssueKind;
    use crate::schema::entity::{EntityId, EntityKind};

    fn dangling_edge() -> Issue {
        Issue {
            kind: IssueKind::DanglingReference,
            rule: Rule::Reference(RefField::EdgeFaction),
            source: EntityKind::Edge,
            source_id: EntityId::from("edges[0]"),
            field: "factionId".to_string(),
            slot: None,
            value: Some(EntityId::from("faction-gone")),
            detail: "`faction-gone` is not a faction".to_string(),
        }
    }

    #[test]
    fn empty_report_passes_every_category() {
        let report = ValidationReport::from_issues(Vec::new());
        assert!(report.is_clean());
        assert_eq!(report.categories.len(), Rule::catalog().len());
        assert!(report.to_string().lines().all(|l| !l.starts_with("[FAIL]")));
    }

    #[test]
    fn issues_land_in_their_category() {
        let report = ValidationReport::from_issues(vec![dangling_edge()]);
        assert!(!report.is_clean());
        assert_eq!(report.issue_count(), 1);
        let failed: Vec<_> = report.failed_categories().map(|c| c.rule).collect();
        assert_eq!(failed, vec![Rule::Reference(RefField::EdgeFaction)]);
        let rendered = report.to_string();
        assert!(rendered.contains("[FAIL]"));
        assert!(rendered.contains("faction-gone"));
    }
}
