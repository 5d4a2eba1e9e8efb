//! Command implementations.
//!
//! Each command returns the text to print so it can be checked without a
//! terminal.

use std::fmt::Write as _;

use facetry_client::{BackendConfig, ClientConfig, ResultSet, SearchSession};
use facetry_core::{FilterForest, NodeId, SearchState, SearchStateUpdate, SelectionState, SortType};
use facetry_query::TotalRelation;

use crate::cli::{Args, Command, QueryArgs};
use crate::error::{Error, Result};

/// Loads the configuration file, if any, and applies command-line overrides.
pub fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config.backend = BackendConfig::Http {
            endpoint: endpoint.clone(),
        };
    }
    if let Some(corpus) = &args.corpus {
        config.backend = BackendConfig::Memory {
            corpus: corpus.clone(),
        };
    }
    if let Some(catalog) = &args.catalog {
        config.catalog = Some(catalog.clone());
    }
    config.validate()?;
    Ok(config)
}

/// Runs the parsed command.
pub async fn run(args: Args) -> Result<String> {
    let config = load_config(&args)?;
    let session = config.build_session()?;
    match args.command {
        Command::Search {
            query,
            sort,
            exact,
            pages,
        } => {
            if let Some(sort) = sort
                && config.query.profile(query.result_type).sort(sort).is_none()
            {
                return Err(Error::InvalidArgument(format!(
                    "sort '{sort}' is not available for {}",
                    query.result_type
                )));
            }
            search(&session, &query, sort, exact, pages).await
        }
        Command::Facets { query, leaves } => facets(&session, &query, leaves.as_deref()).await,
    }
}

/// Searches and renders up to `pages` pages of hits.
pub async fn search(
    session: &SearchSession,
    args: &QueryArgs,
    sort: Option<SortType>,
    exact: bool,
    pages: usize,
) -> Result<String> {
    let rt = args.result_type;
    let mut state = prepare(session, args);
    if let Some(sort) = sort {
        state = state.with_sort(sort);
    }
    session.replace_state(state.with_exact(exact));

    session.search(rt).await?;
    for _ in 1..pages {
        if !session.results(rt).can_load_more() {
            break;
        }
        session.load_next_page(rt).await?;
    }

    let results = session.results(rt);
    if let Some(error) = results.error() {
        return Err(Error::SearchFailed(error.to_string()));
    }
    if args.json {
        return Ok(serde_json::to_string_pretty(&results)?);
    }

    let state = session.state(rt);
    let mut out = render_hits(&results, state.active_field());
    if !state.orphan_filters().is_empty() {
        let _ = writeln!(out, "Filters not found: {}", state.orphan_filters().join(", "));
    }
    Ok(out)
}

/// Searches and renders the facet trees.
pub async fn facets(
    session: &SearchSession,
    args: &QueryArgs,
    leaves: Option<&str>,
) -> Result<String> {
    let rt = args.result_type;
    session.replace_state(prepare(session, args));
    session.search(rt).await?;

    let results = session.results(rt);
    if let Some(error) = results.error() {
        return Err(Error::SearchFailed(error.to_string()));
    }
    let state = session.state(rt);
    if args.json {
        return Ok(serde_json::to_string_pretty(state.available_filters())?);
    }

    let forest = state.available_filters();
    let mut out = match leaves {
        Some(text) => render_leaves(forest, text),
        None => render_forest(forest),
    };
    if !state.orphan_filters().is_empty() {
        let _ = writeln!(out, "Filters not found: {}", state.orphan_filters().join(", "));
    }
    let _ = writeln!(out, "{}", render_total(&results));
    Ok(out)
}

/// Starts the query and applies the requested filters as pending.
fn prepare(session: &SearchSession, args: &QueryArgs) -> SearchState {
    session.set_query(&args.query);
    let state = session.state(args.result_type);
    if args.filters.is_empty() {
        return state;
    }
    let applied = args
        .filters
        .iter()
        .map(|filter| (filter.key.clone(), filter.facet))
        .collect();
    tracing::debug!(result_type = %args.result_type, "applying {} filter(s)", args.filters.len());
    state.update(SearchStateUpdate {
        applied: Some(applied),
        ..Default::default()
    })
}

// ============================================================================
// Rendering
// ============================================================================

/// `"Showing n of total"`, with `+` on lower-bound totals.
pub fn render_total(results: &ResultSet) -> String {
    let total = results.total();
    let bound = match total.relation {
        TotalRelation::Eq => "",
        TotalRelation::Gte => "+",
    };
    format!(
        "Showing {} of {}{} {}",
        results.entries().len(),
        total.value,
        bound,
        results.result_type()
    )
}

/// One numbered line per entry, with the first highlight fragment below.
pub fn render_hits(results: &ResultSet, field: &str) -> String {
    let mut out = String::new();
    for (i, entry) in results.entries().iter().enumerate() {
        let hit = &entry.hit;
        let label = hit.reference().unwrap_or(&hit.id);
        let _ = write!(out, "{:>3}. {}", i + 1, label);
        if let Some(path) = hit.path() {
            let _ = write!(out, "  [{path}]");
        }
        match entry.duplicates.len() {
            0 => {}
            1 => out.push_str("  (+1 version)"),
            n => {
                let _ = write!(out, "  (+{n} versions)");
            }
        }
        out.push('\n');
        if let Some(fragment) = hit.fragments(field).first() {
            let _ = writeln!(out, "     {}", fragment.trim());
        }
    }
    let _ = writeln!(out, "{}", render_total(results));
    if results.more_to_load() {
        out.push_str("More results available (use --pages)\n");
    }
    out
}

fn marker(selection: SelectionState) -> &'static str {
    match selection {
        SelectionState::Selected => "[x]",
        SelectionState::Partial => "[-]",
        SelectionState::Unselected => "[ ]",
    }
}

/// The facet trees, indented by depth.
pub fn render_forest(forest: &FilterForest) -> String {
    let mut out = String::new();
    let mut stack: Vec<(NodeId, usize)> = forest.roots().iter().rev().map(|&id| (id, 0)).collect();
    while let Some((id, depth)) = stack.pop() {
        render_node(&mut out, forest, id, depth);
        stack.extend(forest.children(id).iter().rev().map(|&child| (child, depth + 1)));
    }
    out
}

/// Leaves matching `text`, one per line.
pub fn render_leaves(forest: &FilterForest, text: &str) -> String {
    let mut out = String::new();
    for id in forest.all_leaves(Some(text)) {
        render_node(&mut out, forest, id, 0);
    }
    out
}

fn render_node(out: &mut String, forest: &FilterForest, id: NodeId, depth: usize) {
    let node = forest.node(id);
    let _ = write!(
        out,
        "{:indent$}{} {} ({})",
        "",
        marker(node.selection()),
        node.title(),
        node.doc_count(),
        indent = depth * 2
    );
    if !node.localized_title().is_empty() {
        let _ = write!(out, "  {}", node.localized_title());
    }
    out.push('\n');
}
