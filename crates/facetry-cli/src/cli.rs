//! Command-line arguments.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args as ClapArgs, Parser, Subcommand};
use facetry_core::{FacetType, ResultType, SortType};

/// Facetry - faceted full-text search from the command line
#[derive(Parser, Debug)]
#[command(name = "facetry")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "FACETRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Search an Elasticsearch-compatible server at this URL
    #[arg(long, env = "FACETRY_ENDPOINT", conflicts_with = "corpus")]
    pub endpoint: Option<String>,

    /// Search a JSON corpus in memory instead of a server
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Catalog file shaping the category tree
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search and print hits
    Search {
        #[command(flatten)]
        query: QueryArgs,

        /// Sort order (relevance, chronological, date_created)
        #[arg(long)]
        sort: Option<SortType>,

        /// Match the exact field instead of the broad one
        #[arg(long)]
        exact: bool,

        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Search and print the facet tree with counts
    Facets {
        #[command(flatten)]
        query: QueryArgs,

        /// Only show leaves whose title contains a word starting with this
        #[arg(long)]
        leaves: Option<String>,
    },
}

/// Arguments shared by every search command.
#[derive(ClapArgs, Debug)]
pub struct QueryArgs {
    /// Free-text query
    pub query: String,

    /// Result type to search (documents, collections)
    #[arg(short = 't', long = "type", default_value = "documents")]
    pub result_type: ResultType,

    /// Applied filter as facet:key, e.g. path:Tanakh/Torah (repeatable)
    #[arg(short, long = "filter")]
    pub filters: Vec<FilterArg>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// A `facet:key` filter argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterArg {
    /// Facet type the key belongs to.
    pub facet: FacetType,
    /// Filter key.
    pub key: String,
}

impl FromStr for FilterArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (facet, key) = s
            .split_once(':')
            .ok_or_else(|| format!("expected facet:key, got '{s}'"))?;
        let facet = facet.parse::<FacetType>().map_err(|e| e.to_string())?;
        if key.is_empty() {
            return Err(format!("empty key in filter '{s}'"));
        }
        Ok(Self {
            facet,
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let args = Args::try_parse_from([
            "facetry",
            "--corpus",
            "corpus.json",
            "search",
            "Abraham",
            "-f",
            "path:Tanakh/Torah",
            "--filter",
            "path:Mishnah",
            "--sort",
            "chronological",
            "--exact",
            "--pages",
            "2",
        ])
        .unwrap();
        let Command::Search {
            query,
            sort,
            exact,
            pages,
        } = args.command
        else {
            unreachable!("Expected search command");
        };
        assert_eq!(query.query, "Abraham");
        assert_eq!(query.result_type, ResultType::Documents);
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[0].key, "Tanakh/Torah");
        assert_eq!(sort, Some(SortType::Chronological));
        assert!(exact);
        assert_eq!(pages, 2);
    }

    #[test]
    fn test_parse_facets_for_collections() {
        let args = Args::try_parse_from([
            "facetry",
            "facets",
            "shabbat",
            "--type",
            "collections",
            "--json",
        ])
        .unwrap();
        let Command::Facets { query, leaves } = args.command else {
            unreachable!("Expected facets command");
        };
        assert_eq!(query.result_type, ResultType::Collections);
        assert!(query.json);
        assert!(leaves.is_none());
    }

    #[test]
    fn test_filter_arg() {
        let filter: FilterArg = "topics:shabbat".parse().unwrap();
        assert_eq!(filter.facet, FacetType::Topic);
        assert_eq!(filter.key, "shabbat");

        assert!("shabbat".parse::<FilterArg>().is_err());
        assert!("tags:x".parse::<FilterArg>().is_err());
        assert!("path:".parse::<FilterArg>().is_err());
    }

    #[test]
    fn test_endpoint_conflicts_with_corpus() {
        let result = Args::try_parse_from([
            "facetry",
            "--endpoint",
            "http://localhost:9200",
            "--corpus",
            "c.json",
            "search",
            "x",
        ]);
        assert!(result.is_err());
    }
}
