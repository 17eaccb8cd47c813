use crate::application::{Config, SearchApp, filters_from_parts, init_logging};
use crate::entities::{DateFilter, Day, Period, SearchRequest, TagId};
use crate::search::{LoadState, SearchUiState};
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Search a day-by-day journal by text, date, location and tag")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search entries; prints this year's quick matches and the full result list
    Search {
        /// Text matched against summaries and tag content (may be empty)
        #[arg(default_value = "")]
        text: String,
        /// Earliest date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Latest date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Only entries older than: week, month, six-months, year
        #[arg(long, conflicts_with_all = ["from", "to"])]
        older_than: Option<Period>,
        /// Location id filter (repeatable)
        #[arg(long = "location")]
        locations: Vec<i64>,
        /// Tag id filter (repeatable)
        #[arg(long = "tag")]
        tags: Vec<i64>,
        /// Print the composed search state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show previous searches, most recent first
    History,
    /// List locations and tags available as filters
    Options,
    /// Create or replace an entry
    Day {
        /// Entry date (YYYY-MM-DD format, defaults to today)
        #[arg(short, long)]
        date: Option<String>,
        /// Summary text
        #[arg(short, long, default_value = "")]
        summary: String,
        #[arg(long)]
        favorite: bool,
        /// Location id
        #[arg(long)]
        location: Option<i64>,
        /// Tag as ID or ID=CONTENT (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Add a location
    Location {
        name: String,
        #[arg(allow_hyphen_values = true)]
        latitude: f64,
        #[arg(allow_hyphen_values = true)]
        longitude: f64,
    },
    /// Add a tag
    Tag { name: String },
}

impl Cli {
    pub async fn run() -> Result<()> {
        let cli = Self::parse();
        let config = Config::from_env()?;

        let _log_guard = init_logging(&config)?;

        let app = SearchApp::open(config)?;

        match cli.command {
            Commands::Search {
                text,
                from,
                to,
                older_than,
                locations,
                tags,
                json,
            } => {
                let date = match older_than {
                    Some(period) => DateFilter::OlderThan(period),
                    None if from.is_none() && to.is_none() => DateFilter::Any,
                    None => DateFilter::Custom {
                        start: from.as_deref().map(parse_date).transpose()?,
                        end: to.as_deref().map(parse_date).transpose()?,
                    },
                };
                let request = SearchRequest::new(text)
                    .with_filters(filters_from_parts(date, &locations, &tags));

                let state = app.run_search(request).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&state)?);
                } else {
                    print_state(&state);
                }
            }
            Commands::History => {
                for query in app.history() {
                    println!("{}", query);
                }
            }
            Commands::Options => {
                let (locations, tags) = app.options().await?;
                println!("Locations:");
                for location in locations {
                    println!(
                        "  {:>4}  {} ({:.4}, {:.4})",
                        location.id, location.name, location.latitude, location.longitude
                    );
                }
                println!("Tags:");
                for tag in tags {
                    println!("  {:>4}  {}", tag.id, tag.name);
                }
            }
            Commands::Day {
                date,
                summary,
                favorite,
                location,
                tags,
            } => {
                let date = match date {
                    Some(date_str) => parse_date(&date_str)?,
                    None => Local::now().naive_local().date(),
                };
                let tags = tags
                    .iter()
                    .map(|tag| parse_tag(tag))
                    .collect::<Result<Vec<_>>>()?;

                let day = app.write_day(date, &summary, favorite, location, &tags).await?;
                println!("Saved entry for {}", date);
                print_day(&day);
            }
            Commands::Location {
                name,
                latitude,
                longitude,
            } => {
                let location = app.add_location(&name, latitude, longitude).await?;
                println!("Added location {} '{}'", location.id, location.name);
            }
            Commands::Tag { name } => {
                let tag = app.add_tag(&name).await?;
                println!("Added tag {} '{}'", tag.id, tag.name);
            }
        }

        Ok(())
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date_str))
}

/// Parses `ID` or `ID=CONTENT`.
fn parse_tag(value: &str) -> Result<(TagId, Option<String>)> {
    let (id, content) = match value.split_once('=') {
        Some((id, content)) => (id, Some(content.to_string())),
        None => (value, None),
    };
    let id = id
        .trim()
        .parse::<TagId>()
        .with_context(|| format!("Invalid tag '{}', expected ID or ID=CONTENT", value))?;
    if id <= 0 {
        bail!("Tag id must be positive, got {}", id);
    }
    Ok((id, content))
}

fn print_state(state: &SearchUiState) {
    println!("This year ({} matches):", state.quick_results.len());
    for day in &state.quick_results {
        print_day(day);
    }

    match &state.full_results {
        LoadState::Success(days) => {
            println!("All entries ({} matches):", days.len());
            for day in days {
                print_day(day);
            }
        }
        LoadState::Loading => println!("All entries: still loading"),
        LoadState::Error(message) => println!("All entries: {}", message),
    }
}

fn print_day(day: &Day) {
    let date = day
        .date()
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| format!("day {}", day.id));
    let marker = if day.favorite { "★" } else { " " };

    let mut line = format!("  {} {} {}", date, marker, day.summary);
    if let Some(location) = &day.location {
        line.push_str(&format!(" @{}", location.name));
    }
    println!("{}", line);

    for content_tag in &day.tags {
        match &content_tag.content {
            Some(content) => println!("      #{}: {}", content_tag.tag.name, content),
            None => println!("      #{}", content_tag.tag.name),
        }
    }
}
