/// Which list of videos the feed asks the backend for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogQuery {
    /// Every category at once
    All,
    Category(String),
    /// The twenty most liked videos
    Top20,
    Search {
        q: String,
        category: Option<String>,
    },
}

impl CatalogQuery {
    /// Maps the category name used by the UI onto a query; `"all"` is the catalogue-wide list.
    pub fn for_category(category: &str) -> Self {
        match category {
            "" | "all" => CatalogQuery::All,
            "top20" => CatalogQuery::Top20,
            other => CatalogQuery::Category(other.to_string()),
        }
    }

    /// Category label remembered alongside the last viewed video.
    pub fn label(&self) -> String {
        match self {
            CatalogQuery::All => String::from("all"),
            CatalogQuery::Category(category) => category.clone(),
            CatalogQuery::Top20 => String::from("top20"),
            CatalogQuery::Search { q, .. } => format!("search:{q}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_map_to_queries() {
        assert_eq!(CatalogQuery::for_category("all"), CatalogQuery::All);
        assert_eq!(CatalogQuery::for_category("top20"), CatalogQuery::Top20);
        assert_eq!(
            CatalogQuery::for_category("videos1"),
            CatalogQuery::Category(String::from("videos1"))
        );
        assert_eq!(CatalogQuery::for_category("videos1").label(), "videos1");
    }
}
