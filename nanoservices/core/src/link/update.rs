use std::fmt;

/// Identity of one transfer cycle, handed to every pull and push of that cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Update {
    tags: Vec<String>,
    transfer_number: u64,
}

impl Update {
    pub fn new(tags: Vec<String>, transfer_number: u64) -> Self {
        Self {
            tags,
            transfer_number,
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn transfer_number(&self) -> u64 {
        self.transfer_number
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tag in &self.tags {
            write!(f, "{tag}.")?;
        }
        write!(f, "{}", self.transfer_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tags_then_number() {
        let update = Update::new(vec!["weather".into(), "hourly".into()], 7);
        assert_eq!(update.to_string(), "weather.hourly.7");
    }

    #[test]
    fn renders_bare_number_without_tags() {
        assert_eq!(Update::new(Vec::new(), 0).to_string(), "0");
    }
}
