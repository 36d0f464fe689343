use crate::stored_object;

stored_object!(Category, "category", {
    name: String,
    description: String,
    #[serde(default)]
    document_count: u64
});

impl Category {
    /// New catalog entry keyed by its name, counting its first document.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: name.clone(),
            created_at: now,
            updated_at: now,
            description: default_description(&name),
            name,
            document_count: 1,
        }
    }
}

pub fn default_description(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "technology" => {
            "Documents related to technology, programming, software development, and tech news"
                .to_string()
        }
        "technology update" => {
            "Latest technology updates, product launches, and software releases".to_string()
        }
        "newspaper article" => "News articles, breaking news, and current events".to_string(),
        "simple article" => "General articles, blog posts, tutorials, and guides".to_string(),
        "unknown" => "Uncategorized documents".to_string(),
        _ => format!("Documents categorized as {name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_categories_have_fixed_descriptions() {
        assert_eq!(default_description("Unknown"), "Uncategorized documents");
        assert!(default_description("Technology Update").starts_with("Latest technology"));
    }

    #[test]
    fn other_categories_get_generic_description() {
        let category = Category::new("Gardening");
        assert_eq!(category.id, "Gardening");
        assert_eq!(category.description, "Documents categorized as Gardening");
        assert_eq!(category.document_count, 1);
    }
}
