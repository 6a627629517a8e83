//! Line-oriented command parsing and text rendering for the console.

use core::fmt::Write as _;

use monafarms_core::PlayerStats;
use monafarms_farm::catalog;
use monafarms_types::{ActionKind, CropId, FarmAction, FarmView, Inventory, TileIndex, ViewState};

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print the current farm view.
    Show,
    /// Submit an action on a tile.
    Act {
        /// Target tile.
        tile: TileIndex,
        /// What to do.
        action: FarmAction,
    },
    /// List the actions worth offering for a tile.
    Actions {
        /// Target tile.
        tile: TileIndex,
    },
    /// Re-read one tile, or every tile when `None`.
    Refresh {
        /// Target tile.
        tile: Option<TileIndex>,
    },
    /// Print the player's inventory.
    Inventory,
    /// Print the crop catalog.
    Crops,
    /// Print player stats and recent activity.
    Stats,
    /// Print command help.
    Help,
    /// Exit the client.
    Quit,
}

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line was blank.
    #[error("empty command")]
    Empty,

    /// The first word is not a command.
    #[error("unknown command '{word}', try 'help'")]
    UnknownCommand {
        /// The word given.
        word: String,
    },

    /// A required argument is missing.
    #[error("usage: {usage}")]
    Usage {
        /// Expected form.
        usage: &'static str,
    },

    /// A tile number did not parse.
    #[error("'{raw}' is not a tile number")]
    BadTile {
        /// The text given.
        raw: String,
    },

    /// The crop name or id is not in the catalog.
    #[error("unknown crop '{raw}', try 'crops'")]
    UnknownCrop {
        /// The text given.
        raw: String,
    },
}

/// Help text listing every command.
pub const HELP: &str = "\
commands:
  show                     farm overview
  plant <tile> <crop>      plant a seed
  water <tile>             water a crop
  fertilize <tile>         fertilize a crop
  harvest <tile>           harvest a ready crop
  actions <tile>           what can be done on a tile
  refresh [tile]           re-read one tile or the whole farm
  inventory                seeds, charges, and produce
  crops                    crop catalog
  stats                    counters and recent activity
  quit                     exit";

/// Parse one input line.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Err(ParseError::Empty);
    };

    match word.to_ascii_lowercase().as_str() {
        "show" | "ls" => Ok(Command::Show),
        "plant" => {
            let usage = "plant <tile> <crop>";
            let tile = parse_tile(words.next().ok_or(ParseError::Usage { usage })?)?;
            let rest: Vec<&str> = words.collect();
            if rest.is_empty() {
                return Err(ParseError::Usage { usage });
            }
            let crop = parse_crop(&rest.join(" "))?;
            Ok(Command::Act {
                tile,
                action: FarmAction::Plant { crop },
            })
        }
        "water" => tile_action(words.next(), "water <tile>", FarmAction::Water),
        "fertilize" | "fert" => tile_action(words.next(), "fertilize <tile>", FarmAction::Fertilize),
        "harvest" => tile_action(words.next(), "harvest <tile>", FarmAction::Harvest),
        "actions" => {
            let raw = words.next().ok_or(ParseError::Usage {
                usage: "actions <tile>",
            })?;
            Ok(Command::Actions {
                tile: parse_tile(raw)?,
            })
        }
        "refresh" => Ok(Command::Refresh {
            tile: words.next().map(parse_tile).transpose()?,
        }),
        "inventory" | "inv" => Ok(Command::Inventory),
        "crops" => Ok(Command::Crops),
        "stats" => Ok(Command::Stats),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        _ => Err(ParseError::UnknownCommand {
            word: word.to_owned(),
        }),
    }
}

fn tile_action(
    raw: Option<&str>,
    usage: &'static str,
    action: FarmAction,
) -> Result<Command, ParseError> {
    let tile = parse_tile(raw.ok_or(ParseError::Usage { usage })?)?;
    Ok(Command::Act { tile, action })
}

fn parse_tile(raw: &str) -> Result<TileIndex, ParseError> {
    raw.parse::<u32>()
        .map(TileIndex)
        .map_err(|_not_a_number| ParseError::BadTile { raw: raw.to_owned() })
}

fn parse_crop(raw: &str) -> Result<CropId, ParseError> {
    let by_id = raw
        .parse::<u16>()
        .ok()
        .and_then(|id| catalog::lookup(CropId(id)));
    by_id
        .or_else(|| catalog::by_name(raw))
        .map(|info| info.id)
        .ok_or_else(|| ParseError::UnknownCrop { raw: raw.to_owned() })
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Format seconds as `1h02m`, `4m05s`, or `12s`.
pub fn countdown(secs: u64) -> String {
    let hours = secs / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// One line per loaded tile.
pub fn render_farm(view: &FarmView) -> String {
    if view.tiles.is_empty() {
        return "farm not loaded yet".to_owned();
    }
    let mut out = String::new();
    for tile in &view.tiles {
        let crop = tile.crop_name.as_deref().unwrap_or("-");
        let state = match tile.state {
            ViewState::Empty => "empty".to_owned(),
            ViewState::NeedsWater => format!("needs water, {} left", countdown(tile.seconds_until_ready)),
            ViewState::Growing { percent } => {
                format!("{percent:>3}%, {} left", countdown(tile.seconds_until_ready))
            }
            ViewState::Ready => "ready".to_owned(),
        };
        let _ = write!(out, "[{:>2}] {crop:<14} {state}", tile.index);
        if let Some(wait) = tile.seconds_until_window.filter(|w| *w > 0) {
            let _ = write!(out, " (harvest window opens in {})", countdown(wait));
        }
        if tile.locked {
            out.push_str(" [locked]");
        }
        if tile.stale {
            out.push_str(" [refreshing]");
        }
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

/// Seeds, charges, and produce.
pub fn render_inventory(inventory: &Inventory) -> String {
    let mut out = format!(
        "water: {}  fertilizer: {}\nseeds:",
        inventory.water_charges, inventory.fertilizer_charges
    );
    let seeds: Vec<String> = inventory
        .seeds
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(crop, n)| format!("{} x{n}", catalog::name_of(*crop)))
        .collect();
    out.push(' ');
    out.push_str(&if seeds.is_empty() { "none".to_owned() } else { seeds.join(", ") });

    let produce: Vec<String> = inventory
        .produce
        .iter()
        .map(|(crop, n)| format!("{} x{n}", catalog::name_of(*crop)))
        .collect();
    if !produce.is_empty() {
        let _ = write!(out, "\nproduce: {}", produce.join(", "));
    }
    out
}

/// Crop catalog table.
pub fn render_crops() -> String {
    let lines: Vec<String> = catalog::CROPS
        .iter()
        .map(|c| {
            let window = c
                .harvest_window
                .map(|w| format!(", harvest {w}"))
                .unwrap_or_default();
            format!(
                "{:>2} {:<14} {:?}, {}{window}",
                c.id,
                c.name,
                c.rarity,
                countdown(c.growth_secs)
            )
        })
        .collect();
    lines.join("\n")
}

/// Counters and recent activity.
pub fn render_stats(stats: &PlayerStats) -> String {
    let mut out = format!(
        "planted {}  watered {}  fertilized {}  harvested {}",
        stats.planted, stats.watered, stats.fertilized, stats.harvested
    );
    for entry in stats.recent.iter().rev().take(5) {
        let crop = entry.crop.map_or("-", catalog::name_of);
        let _ = write!(
            out,
            "\n  {} {crop} on tile {} ({})",
            entry.action, entry.tile, entry.tx_hash
        );
    }
    out
}

/// Offered actions as a comma-separated list.
pub fn render_actions(tile: TileIndex, actions: &[ActionKind]) -> String {
    if actions.is_empty() {
        return format!("nothing to do on tile {tile} right now");
    }
    let names: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
    format!("tile {tile}: {}", names.join(", "))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use monafarms_farm::catalog::{GOLDEN_MELON, WHEAT};
    use monafarms_types::{TileStage, TileView};

    use super::*;

    #[test]
    fn parses_actions() {
        assert_eq!(
            parse("plant 3 wheat"),
            Ok(Command::Act {
                tile: TileIndex(3),
                action: FarmAction::Plant { crop: WHEAT }
            })
        );
        assert_eq!(
            parse("plant 0 golden melon"),
            Ok(Command::Act {
                tile: TileIndex(0),
                action: FarmAction::Plant { crop: GOLDEN_MELON }
            })
        );
        assert_eq!(
            parse("plant 1 1"),
            Ok(Command::Act {
                tile: TileIndex(1),
                action: FarmAction::Plant { crop: WHEAT }
            })
        );
        assert_eq!(
            parse("  HARVEST 7 "),
            Ok(Command::Act {
                tile: TileIndex(7),
                action: FarmAction::Harvest
            })
        );
    }

    #[test]
    fn parses_other_commands() {
        assert_eq!(parse("show"), Ok(Command::Show));
        assert_eq!(parse("refresh"), Ok(Command::Refresh { tile: None }));
        assert_eq!(
            parse("refresh 2"),
            Ok(Command::Refresh {
                tile: Some(TileIndex(2))
            })
        );
        assert_eq!(parse("actions 4"), Ok(Command::Actions { tile: TileIndex(4) }));
        assert_eq!(parse("inv"), Ok(Command::Inventory));
        assert_eq!(parse("exit"), Ok(Command::Quit));
    }

    #[test]
    fn reports_parse_errors() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(
            parse("dig 1"),
            Err(ParseError::UnknownCommand {
                word: "dig".to_owned()
            })
        );
        assert!(matches!(parse("water"), Err(ParseError::Usage { .. })));
        assert!(matches!(parse("plant 2"), Err(ParseError::Usage { .. })));
        assert_eq!(
            parse("water x"),
            Err(ParseError::BadTile { raw: "x".to_owned() })
        );
        assert_eq!(
            parse("plant 1 kale"),
            Err(ParseError::UnknownCrop {
                raw: "kale".to_owned()
            })
        );
    }

    #[test]
    fn countdown_formats() {
        assert_eq!(countdown(0), "0s");
        assert_eq!(countdown(65), "1m05s");
        assert_eq!(countdown(3_720), "1h02m");
    }

    #[test]
    fn renders_farm_lines() {
        let view = FarmView {
            now: 0,
            tiles: vec![
                TileView {
                    index: TileIndex(0),
                    crop: Some(WHEAT),
                    crop_name: Some("Wheat".to_owned()),
                    state: ViewState::Growing { percent: 50 },
                    stage: TileStage::GrowingWatered,
                    seconds_until_ready: 1_800,
                    seconds_until_window: None,
                    locked: false,
                    stale: true,
                },
                TileView {
                    index: TileIndex(1),
                    crop: None,
                    crop_name: None,
                    state: ViewState::Empty,
                    stage: TileStage::Empty,
                    seconds_until_ready: 0,
                    seconds_until_window: None,
                    locked: true,
                    stale: false,
                },
            ],
        };
        let text = render_farm(&view);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.first().unwrap().contains("50%, 30m00s left"));
        assert!(lines.first().unwrap().ends_with("[refreshing]"));
        assert!(lines.get(1).unwrap().ends_with("[locked]"));
        assert_eq!(render_farm(&FarmView::default()), "farm not loaded yet");
    }

    #[test]
    fn renders_inventory() {
        let mut inventory = Inventory {
            water_charges: 3,
            ..Inventory::default()
        };
        assert!(render_inventory(&inventory).contains("seeds: none"));
        inventory.seeds.insert(WHEAT, 2);
        inventory.produce.insert(WHEAT, 1);
        let text = render_inventory(&inventory);
        assert!(text.contains("seeds: Wheat x2"));
        assert!(text.contains("produce: Wheat x1"));
    }

    #[test]
    fn renders_catalog_and_actions() {
        assert_eq!(render_crops().lines().count(), catalog::CROPS.len());
        assert_eq!(
            render_actions(TileIndex(2), &[ActionKind::Water, ActionKind::Fertilize]),
            "tile 2: water, fertilize"
        );
        assert!(render_actions(TileIndex(2), &[]).starts_with("nothing"));
    }
}
