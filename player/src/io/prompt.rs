//! Prompt pack builder: renders a snapshot into the oracle's state description.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::snapshot::{GameStateSnapshot, SquareView};
use crate::core::types::ActionName;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");

/// Drop order when the rendered prompt exceeds its byte budget.
const DROP_ORDER: [&str; 4] = ["history", "others", "monopolies", "holdings"];

#[derive(Debug, Clone, Serialize)]
struct StatusView {
    name: String,
    cash: i64,
    asset_value: i64,
    has_jail_card: bool,
}

/// Pre-formatted lines per prompt section.
#[derive(Debug, Clone, Serialize)]
struct TurnView {
    heading: &'static str,
    me: StatusView,
    position: Vec<String>,
    dice: Vec<String>,
    jail: Vec<String>,
    prompt: Vec<String>,
    holdings: Vec<String>,
    monopolies: Vec<String>,
    others: Vec<String>,
    history: Vec<String>,
    actions: Vec<&'static str>,
}

impl TurnView {
    fn from_snapshot(s: &GameStateSnapshot) -> Self {
        let me = match s.acting_actor() {
            Some(actor) => StatusView {
                name: actor.name.clone(),
                cash: actor.cash,
                asset_value: actor.asset_value,
                has_jail_card: actor.has_jail_card,
            },
            None => StatusView {
                name: format!("actor {}", s.acting),
                cash: 0,
                asset_value: 0,
                has_jail_card: false,
            },
        };
        Self {
            heading: if s.prompt.is_some() {
                "Your Decision"
            } else {
                "Your Turn"
            },
            me,
            position: position_lines(s),
            dice: dice_lines(s),
            jail: jail_lines(s),
            prompt: prompt_lines(s),
            holdings: holdings_lines(s),
            monopolies: monopoly_lines(s),
            others: other_actor_lines(s),
            history: history_lines(s),
            actions: s.legal_actions.iter().map(|name| name.as_str()).collect(),
        }
    }
}

fn actor_name(s: &GameStateSnapshot, index: usize) -> String {
    s.actors
        .get(index)
        .map(|actor| actor.name.clone())
        .unwrap_or_else(|| format!("actor {index}"))
}

/// Name of a square, looked up among the views the snapshot carries.
fn square_name(s: &GameStateSnapshot, index: usize) -> String {
    let owned = s.actors.iter().flat_map(|actor| {
        actor
            .properties_by_group
            .values()
            .flatten()
            .chain(actor.mortgaged.iter())
    });
    owned
        .chain(s.current_square.iter())
        .find(|sq| sq.index == index)
        .map(|sq| sq.name.clone())
        .unwrap_or_else(|| format!("square {index}"))
}

fn building_label(sq: &SquareView) -> String {
    match (sq.hotel, sq.houses) {
        (true, _) => " (HOTEL)".to_string(),
        (false, 0) => String::new(),
        (false, 1) => " (1 house)".to_string(),
        (false, n) => format!(" ({n} houses)"),
    }
}

fn position_lines(s: &GameStateSnapshot) -> Vec<String> {
    let Some(sq) = &s.current_square else {
        return Vec::new();
    };
    let mine = s.acting == s.turn;
    let mut lines = vec![if mine {
        format!("You are on {} (square {}).", sq.name, sq.index)
    } else {
        format!("{} is on {} (square {}).", actor_name(s, s.turn), sq.name, sq.index)
    }];
    if sq.price == 0 {
        return lines;
    }
    match sq.owner {
        None => {
            lines.push(format!(
                "This property is UNOWNED and costs ${}.",
                sq.price
            ));
            if mine && let Some(me) = s.acting_actor() {
                let price = i64::from(sq.price);
                if me.cash >= price {
                    lines.push("You have enough money to buy it.".to_string());
                } else {
                    lines.push(format!("You need ${} more to buy it.", price - me.cash));
                }
            }
        }
        Some(owner) if owner == s.acting => lines.push("You OWN this property.".to_string()),
        Some(owner) => {
            lines.push(format!(
                "This property is owned by {}.",
                actor_name(s, owner)
            ));
            if sq.mortgaged {
                lines.push("The property is mortgaged, so no rent is due.".to_string());
            } else {
                lines.push(format!("Rent due: {}.", sq.rent_label));
            }
        }
    }
    lines
}

fn dice_lines(s: &GameStateSnapshot) -> Vec<String> {
    let Some([a, b]) = s.last_roll else {
        return Vec::new();
    };
    let mut lines = vec![format!("Rolled: {a} + {b} = {}", a + b)];
    if a == b {
        let jailed = s.actors.get(s.turn).is_some_and(|actor| actor.in_jail);
        match s.doubles {
            1 | 2 => {
                lines.push(format!(
                    "DOUBLES! (This was double roll #{} in a row).",
                    s.doubles
                ));
                lines.push("You MUST roll again.".to_string());
            }
            _ if jailed => lines.push("DOUBLES, but the turn ends in JAIL!".to_string()),
            _ => lines.push("DOUBLES! Released from jail, no extra roll.".to_string()),
        }
    }
    lines
}

fn jail_lines(s: &GameStateSnapshot) -> Vec<String> {
    let Some(me) = s.acting_actor() else {
        return Vec::new();
    };
    if s.acting != s.turn || !me.in_jail {
        return Vec::new();
    }
    let mut lines = Vec::new();
    if !s.dice_rolled {
        lines.push(format!(
            "You are in jail. This is release attempt {} of 3.",
            me.jail_attempts + 1
        ));
    } else if me.jail_attempts >= 3 {
        lines.push(
            "Your third release roll failed: pay the $50 fine or use your card.".to_string(),
        );
    } else {
        lines.push(format!(
            "Your release roll failed ({} of 3 used).",
            me.jail_attempts
        ));
    }
    if me.has_jail_card {
        lines.push("You have a 'Get Out of Jail Free' card.".to_string());
    }
    let release: Vec<&str> = s
        .legal_actions
        .iter()
        .filter(|name| {
            matches!(
                name,
                ActionName::Roll | ActionName::PayFine | ActionName::JailCard
            )
        })
        .map(|name| name.as_str())
        .collect();
    if !release.is_empty() {
        lines.push(format!("Available jail actions: {}.", release.join(", ")));
    }
    lines
}

fn prompt_lines(s: &GameStateSnapshot) -> Vec<String> {
    use crate::core::board::PendingPrompt;

    match &s.prompt {
        None => Vec::new(),
        Some(PendingPrompt::Auction {
            square,
            highest_bid,
            highest_bidder,
            bidders,
            ..
        }) => {
            let mut lines = vec![
                "# Auction in progress:".to_string(),
                format!("Property: {} (square {square}).", square_name(s, *square)),
            ];
            match highest_bidder {
                Some(bidder) => lines.push(format!(
                    "Highest bid: ${highest_bid} by {}.",
                    actor_name(s, *bidder)
                )),
                None => lines.push("No bids yet.".to_string()),
            }
            let names: Vec<String> = bidders.iter().map(|b| actor_name(s, *b)).collect();
            lines.push(format!("Bidders still in: {}.", names.join(", ")));
            lines
        }
        Some(PendingPrompt::Trade(offer)) => {
            let describe = |squares: &[usize], money: u32| {
                let mut parts: Vec<String> = squares.iter().map(|i| square_name(s, *i)).collect();
                if money > 0 {
                    parts.push(format!("${money}"));
                }
                if parts.is_empty() {
                    "nothing".to_string()
                } else {
                    parts.join(", ")
                }
            };
            vec![
                format!("# Trade offer from {}:", actor_name(s, offer.from)),
                format!(
                    "They offer: {}.",
                    describe(&offer.offered_squares, offer.offered_money)
                ),
                format!(
                    "They request: {}.",
                    describe(&offer.requested_squares, offer.requested_money)
                ),
            ]
        }
    }
}

fn holdings_lines(s: &GameStateSnapshot) -> Vec<String> {
    let Some(me) = s.acting_actor() else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    for (group, squares) in &me.properties_by_group {
        let status = if me.buildable_groups.contains(group) {
            "BUILDABLE MONOPOLY".to_string()
        } else {
            format!("{} owned", squares.len())
        };
        lines.push(format!("## {} Group ({status}):", group.label()));
        for sq in squares {
            lines.push(format!(
                "- {} [square {}]{}",
                sq.name,
                sq.index,
                building_label(sq)
            ));
        }
    }
    if lines.is_empty() && me.mortgaged.is_empty() {
        lines.push("You don't own any properties yet.".to_string());
    }
    if !me.mortgaged.is_empty() {
        lines.push("## Mortgaged:".to_string());
        for sq in &me.mortgaged {
            let group = sq.group.map(|g| g.label()).unwrap_or("-");
            lines.push(format!(
                "- {} [square {}] ({group}) - Unmortgage cost: ${}",
                sq.name, sq.index, sq.unmortgage_cost
            ));
        }
    }
    lines
}

fn monopoly_lines(s: &GameStateSnapshot) -> Vec<String> {
    if s.monopolies.is_empty() {
        return vec!["No player has a monopoly yet.".to_string()];
    }
    s.monopolies
        .iter()
        .map(|monopoly| {
            let owner = if monopoly.owner == s.acting {
                "(Owned by You)".to_string()
            } else {
                format!("(Owned by {})", monopoly.owner_name)
            };
            format!("- {} monopoly {owner}", monopoly.group.label())
        })
        .collect()
}

fn other_actor_lines(s: &GameStateSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    for other in s.actors.iter().filter(|actor| actor.index != s.acting) {
        lines.push(format!(
            "## {} (seat {}, ${}):",
            other.name, other.index, other.cash
        ));
        lines.push(format!("- Position: {}", other.position_name));
        if other.in_jail {
            lines.push("- In jail".to_string());
        }
        let mut summary: Vec<String> = other
            .properties_by_group
            .iter()
            .map(|(group, squares)| format!("{} {}", squares.len(), group.label()))
            .collect();
        if !other.mortgaged.is_empty() {
            summary.push(format!("{} Mortgaged", other.mortgaged.len()));
        }
        let summary = if summary.is_empty() {
            "None".to_string()
        } else {
            summary.join(", ")
        };
        lines.push(format!("- Properties: {summary}"));
        lines.push(format!("- Total asset value: ~${}", other.asset_value));
    }
    lines
}

fn history_lines(s: &GameStateSnapshot) -> Vec<String> {
    s.history
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("T-{i}: {} - {}", entry.actor_name, entry.actions.join(", ")))
        .collect()
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(marker: &Regex, rendered: &str) -> Vec<ParsedSection> {
    let matches: Vec<_> = marker.captures_iter(rendered).collect();
    let mut sections = Vec::new();

    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(rendered.len());
        let required = kind.as_str() == "required";
        let content = rendered[whole.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Drop droppable sections in [`DROP_ORDER`], then truncate the largest section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(largest) = sections.iter_mut().max_by_key(|s| s.content.len()) else {
        return;
    };
    let before_len = largest.content.len();
    let allowed = before_len.saturating_sub(total - budget);
    let mut cut = allowed.saturating_sub(12);
    while cut > 0 && !largest.content.is_char_boundary(cut) {
        cut -= 1;
    }
    largest.content.truncate(cut);
    largest.content.push_str("\n[truncated]");
    debug!(
        section = largest.key,
        before_len,
        after_len = largest.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders the system prompt and per-round state descriptions within a byte budget.
#[derive(Debug)]
pub struct PromptBuilder {
    budget_bytes: usize,
    env: Environment<'static>,
    marker: Regex,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("turn", TURN_TEMPLATE)
            .context("load turn template")?;
        let marker = Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .context("compile section marker")?;
        Ok(Self {
            budget_bytes,
            env,
            marker,
        })
    }

    /// Rules reference and turn-flow rules.
    pub fn system_prompt(&self) -> Result<String> {
        let rendered = self.env.get_template("system")?.render(context! {})?;
        Ok(rendered.trim().to_string())
    }

    /// State description for one decision round.
    pub fn turn_prompt(&self, snapshot: &GameStateSnapshot) -> Result<String> {
        let view = TurnView::from_snapshot(snapshot);
        let rendered = self
            .env
            .get_template("turn")?
            .render(&view)
            .context("render turn prompt")?;
        let mut sections = parse_sections(&self.marker, &rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}
