use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweakError {
    pub name: String,
    pub value: String,
    pub expected: &'static str,
}

impl fmt::Display for TweakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tweak {:?}: {:?} is not a valid {}",
            self.name, self.value, self.expected
        )
    }
}

impl std::error::Error for TweakError {}

/// A value that can be shown in and edited from the tweak UI.
///
/// Values travel as strings; the hint tells the UI what kind of editor to
/// offer.
pub trait Tweakable: Send + 'static {
    fn hint() -> &'static str;

    fn to_tweak_string(&self) -> String;

    /// Parses a value sent by the UI.
    fn from_tweak_str(s: &str) -> Option<Self>
    where
        Self: Sized;

    /// Parses `value` for the tweak called `name`.
    fn parse_for(name: &str, value: &str) -> Result<Self, TweakError>
    where
        Self: Sized,
    {
        Self::from_tweak_str(value).ok_or_else(|| TweakError {
            name: name.to_string(),
            value: value.to_string(),
            expected: Self::hint(),
        })
    }
}

macro_rules! tweakable_num {
    ($hint:literal => $($t:ty),*) => {
        $(
            impl Tweakable for $t {
                fn hint() -> &'static str {
                    $hint
                }

                fn to_tweak_string(&self) -> String {
                    self.to_string()
                }

                fn from_tweak_str(s: &str) -> Option<Self> {
                    s.trim().parse().ok()
                }
            }
        )*
    };
}

tweakable_num!("float" => f32, f64);
tweakable_num!("int" => i32, i64, u32, u64);

impl Tweakable for bool {
    fn hint() -> &'static str {
        "bool"
    }

    fn to_tweak_string(&self) -> String {
        self.to_string()
    }

    fn from_tweak_str(s: &str) -> Option<Self> {
        match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl Tweakable for String {
    fn hint() -> &'static str {
        "string"
    }

    fn to_tweak_string(&self) -> String {
        self.clone()
    }

    fn from_tweak_str(s: &str) -> Option<Self> {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_leniently() {
        assert_eq!(f32::from_tweak_str(" 0.25 "), Some(0.25));
        assert_eq!(i32::from_tweak_str("-3"), Some(-3));
        assert_eq!(u32::from_tweak_str("-3"), None);
        assert_eq!(f64::from_tweak_str("fast"), None);
    }

    #[test]
    fn bools_accept_digits() {
        assert_eq!(bool::from_tweak_str("1"), Some(true));
        assert_eq!(bool::from_tweak_str("false"), Some(false));
        assert_eq!(bool::from_tweak_str("yes"), None);
    }
}
