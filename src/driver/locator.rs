//! Locator specifications
//!
//! Platform profiles describe the elements they care about as data. Drivers
//! translate a [`LocatorSpec`] into whatever query language they speak.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declarative element query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocatorSpec {
    /// CSS selector
    Css(String),
    /// Any element whose own text contains the string
    Text(String),
    /// CSS selector narrowed to elements whose text contains `text`
    CssWithText { css: String, text: String },
    /// The `index`-th match (zero based) of the inner locator
    Nth { locator: Box<LocatorSpec>, index: usize },
    /// A locator evaluated inside the first iframe matching `frame`
    Frame { frame: String, locator: Box<LocatorSpec> },
    /// First of several alternatives, in order
    AnyOf(Vec<LocatorSpec>),
}

impl LocatorSpec {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn nth(locator: LocatorSpec, index: usize) -> Self {
        Self::Nth {
            locator: Box::new(locator),
            index,
        }
    }

    pub fn in_frame(frame: impl Into<String>, locator: LocatorSpec) -> Self {
        Self::Frame {
            frame: frame.into(),
            locator: Box::new(locator),
        }
    }

    pub fn any_of(locators: impl IntoIterator<Item = LocatorSpec>) -> Self {
        Self::AnyOf(locators.into_iter().collect())
    }
}

impl fmt::Display for LocatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "css={css}"),
            Self::Text(text) => write!(f, "text={text:?}"),
            Self::CssWithText { css, text } => write!(f, "css={css} has-text={text:?}"),
            Self::Nth { locator, index } => write!(f, "{locator} >> nth={index}"),
            Self::Frame { frame, locator } => write!(f, "frame={frame} >> {locator}"),
            Self::AnyOf(locators) => {
                f.write_str("any(")?;
                for (i, locator) in locators.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{locator}")?;
                }
                f.write_str(")")
            }
        }
    }
}
