use std::fmt;

/// How an element's text has to relate to the expected string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextMatch {
    /// Whitespace-normalised text contains the string.
    Contains(String),
    /// Whitespace-normalised text equals the string.
    Exact(String),
}

/// Field-based description of the element(s) an action targets.
///
/// Nothing in here knows about a concrete selector language; backends compile
/// a `Query` into whatever their engine understands (see [`Query::to_xpath`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Query {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, String)>,
    pub text: Option<TextMatch>,
    /// Descendants the element must contain.
    pub has: Vec<Query>,
    /// Restricts matches to descendants of this element.
    pub within: Option<Box<Query>>,
    /// Only the first match in document order.
    pub first: bool,
}

impl Query {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..Default::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    /// An input whose placeholder is exactly `placeholder`.
    pub fn placeholder(placeholder: &str) -> Self {
        Self::tag("input").attr("placeholder", placeholder)
    }

    /// Any element whose text contains `text`.
    pub fn text(text: &str) -> Self {
        Self::any().has_text(text)
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn role(self, role: &str) -> Self {
        self.attr("role", role)
    }

    pub fn has_text(mut self, text: &str) -> Self {
        self.text = Some(TextMatch::Contains(text.to_string()));
        self
    }

    pub fn text_is(mut self, text: &str) -> Self {
        self.text = Some(TextMatch::Exact(text.to_string()));
        self
    }

    pub fn has(mut self, inner: Query) -> Self {
        self.has.push(inner);
        self
    }

    pub fn within(mut self, scope: Query) -> Self {
        self.within = Some(Box::new(scope));
        self
    }

    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }

    /// Compiles the query into an absolute XPath 1.0 expression.
    pub fn to_xpath(&self) -> String {
        let prefix = match &self.within {
            Some(scope) => scope.to_xpath(),
            None => String::new(),
        };
        let path = format!("{prefix}//{}", self.step());
        if self.first {
            format!("({path})[1]")
        } else {
            path
        }
    }

    fn step(&self) -> String {
        let mut step = self.tag.clone().unwrap_or_else(|| "*".to_string());
        for predicate in self.predicates() {
            step.push('[');
            step.push_str(&predicate);
            step.push(']');
        }
        step
    }

    fn predicates(&self) -> Vec<String> {
        let mut predicates = Vec::new();
        if let Some(id) = &self.id {
            predicates.push(format!("@id={}", xpath_literal(id)));
        }
        for class in &self.classes {
            predicates.push(format!(
                "contains(concat(' ', normalize-space(@class), ' '), {})",
                xpath_literal(&format!(" {class} "))
            ));
        }
        for (name, value) in &self.attributes {
            predicates.push(format!("@{name}={}", xpath_literal(value)));
        }
        let text_predicate = match &self.text {
            Some(TextMatch::Contains(text)) => {
                Some(format!("contains(normalize-space(.), {})", xpath_literal(text)))
            }
            Some(TextMatch::Exact(text)) => {
                Some(format!("normalize-space(.)={}", xpath_literal(text)))
            }
            None => None,
        };
        if let Some(predicate) = text_predicate {
            // Untagged text queries target the element owning the text node,
            // not every ancestor whose string value contains it.
            if self.tag.is_none() {
                predicates.push(format!("text()[{predicate}]"));
            } else {
                predicates.push(predicate);
            }
        }
        for inner in &self.has {
            predicates.push(format!(".//{}", inner.step()));
        }
        predicates
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xpath())
    }
}

/// Quotes a string as an XPath literal. XPath 1.0 has no escapes, so strings
/// holding both quote kinds are stitched together with `concat()`.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_tag_class_and_attribute() {
        let query = Query::tag("input").class("win-button").attr("value", "Next");
        assert_eq!(
            query.to_xpath(),
            "//input[contains(concat(' ', normalize-space(@class), ' '), ' win-button ')][@value='Next']"
        );
    }

    #[test]
    fn compiles_nested_has_and_exact_text() {
        let query = Query::tag("li")
            .has(Query::tag("a").text_is("20:00 Badminton"))
            .has(Query::tag("span").text_is("Wed 11.6."));
        assert_eq!(
            query.to_xpath(),
            "//li[.//a[normalize-space(.)='20:00 Badminton']][.//span[normalize-space(.)='Wed 11.6.']]"
        );
    }

    #[test]
    fn scope_and_first_wrap_the_path() {
        let query = Query::tag("a")
            .has_text("Close")
            .within(Query::tag("div").has(Query::tag("h1").text_is("Sulkapallo")))
            .first();
        assert_eq!(
            query.to_xpath(),
            "(//div[.//h1[normalize-space(.)='Sulkapallo']]//a[contains(normalize-space(.), 'Close')])[1]"
        );
    }

    #[test]
    fn id_and_text_only_queries() {
        assert_eq!(Query::any().id("type").to_xpath(), "//*[@id='type']");
        assert_eq!(
            Query::text("Stay signed in?").to_xpath(),
            "//*[text()[contains(normalize-space(.), 'Stay signed in?')]]"
        );
    }

    #[test]
    fn quotes_apostrophes() {
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal(r#"it's "x""#),
            r#"concat('it', "'", 's "x"')"#
        );
    }
}
