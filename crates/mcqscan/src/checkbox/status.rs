/// Detection status of one checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckboxStatus {
    Checked,
    Unchecked,
    ProbablyChecked,
    ProbablyUnchecked,
}

impl CheckboxStatus {
    pub const ALL: [CheckboxStatus; 4] = [
        Self::Checked,
        Self::Unchecked,
        Self::ProbablyChecked,
        Self::ProbablyUnchecked,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Self::Checked => "CHECKED",
            Self::Unchecked => "UNCHECKED",
            Self::ProbablyChecked => "PROBABLY_CHECKED",
            Self::ProbablyUnchecked => "PROBABLY_UNCHECKED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub const fn seems_checked(self) -> bool {
        matches!(self, Self::Checked | Self::ProbablyChecked)
    }

    /// A `PROBABLY_*` status puts its page in the review queue.
    pub const fn needs_review(self) -> bool {
        matches!(self, Self::ProbablyChecked | Self::ProbablyUnchecked)
    }

    /// Definite status with the same checked-ness.
    pub const fn settled(self) -> Self {
        if self.seems_checked() {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }
}

impl std::fmt::Display for CheckboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_parse_back() {
        for s in CheckboxStatus::ALL {
            assert_eq!(CheckboxStatus::from_code(s.code()), Some(s));
        }
        assert_eq!(CheckboxStatus::from_code("checked"), None);
    }

    #[test]
    fn probable_states_need_review_and_settle() {
        assert!(CheckboxStatus::ProbablyUnchecked.needs_review());
        assert!(!CheckboxStatus::Checked.needs_review());
        assert_eq!(CheckboxStatus::ProbablyChecked.settled(), CheckboxStatus::Checked);
        assert_eq!(CheckboxStatus::ProbablyUnchecked.settled(), CheckboxStatus::Unchecked);
        let json = serde_json::to_string(&CheckboxStatus::ProbablyChecked).expect("serialize");
        assert_eq!(json, "\"PROBABLY_CHECKED\"");
    }
}
