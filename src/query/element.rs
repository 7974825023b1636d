use std::fmt;

/// One clause of a statement: a keyword followed by glued elements.
///
/// `SELECT` + `["a", "b"]` with glue `", "` renders as `SELECT a, b`. An
/// element with an empty name renders its elements only, which is how
/// parenthesised value lists are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryElement {
    name: String,
    elements: Vec<String>,
    glue: String,
}

impl QueryElement {
    pub fn new<I, S>(name: &str, elements: I, glue: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryElement {
            name: name.to_string(),
            elements: elements.into_iter().map(Into::into).collect(),
            glue: glue.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn glue(&self) -> &str {
        &self.glue
    }

    /// Appends elements, keeping the glue chosen when the clause was created.
    pub fn append<I, S>(&mut self, elements: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elements.extend(elements.into_iter().map(Into::into));
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Renders the elements joined by the glue, without the keyword.
    pub fn body(&self) -> String {
        self.elements.join(&self.glue)
    }
}

impl fmt::Display for QueryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.body())
        } else {
            write!(f, "{} {}", self.name, self.body())
        }
    }
}
