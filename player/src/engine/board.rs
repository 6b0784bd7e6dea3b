//! The standard 40-square board used by the table engine.

use crate::core::board::{Group, Square};

pub const GO_SALARY: i64 = 200;
pub const GO_TO_JAIL_SQUARE: usize = 30;

/// Tax squares and the amount they charge.
pub const TAXES: [(usize, i64); 2] = [(4, 200), (38, 100)];

fn street(name: &str, price: u32, group: Group, house_price: u32, rents: [u32; 6]) -> Square {
    Square {
        price,
        group: Some(group),
        house_price,
        rents: rents.to_vec(),
        ..Square::plain(name)
    }
}

fn railroad(name: &str) -> Square {
    Square {
        price: 200,
        group: Some(Group::Railroad),
        ..Square::plain(name)
    }
}

fn utility(name: &str) -> Square {
    Square {
        price: 150,
        group: Some(Group::Utility),
        ..Square::plain(name)
    }
}

/// Fresh, unowned board in square order.
pub fn standard_squares() -> Vec<Square> {
    use Group::{DarkBlue, Green, LightBlue, Orange, Pink, Purple, Red, Yellow};

    vec![
        Square::plain("GO"),
        street("Mediterranean Avenue", 60, Purple, 50, [2, 10, 30, 90, 160, 250]),
        Square::plain("Community Chest"),
        street("Baltic Avenue", 60, Purple, 50, [4, 20, 60, 180, 320, 450]),
        Square::plain("Income Tax"),
        railroad("Reading Railroad"),
        street("Oriental Avenue", 100, LightBlue, 50, [6, 30, 90, 270, 400, 550]),
        Square::plain("Chance"),
        street("Vermont Avenue", 100, LightBlue, 50, [6, 30, 90, 270, 400, 550]),
        street("Connecticut Avenue", 120, LightBlue, 50, [8, 40, 100, 300, 450, 600]),
        Square::plain("Jail / Just Visiting"),
        street("St. Charles Place", 140, Pink, 100, [10, 50, 150, 450, 625, 750]),
        utility("Electric Company"),
        street("States Avenue", 140, Pink, 100, [10, 50, 150, 450, 625, 750]),
        street("Virginia Avenue", 160, Pink, 100, [12, 60, 180, 500, 700, 900]),
        railroad("Pennsylvania Railroad"),
        street("St. James Place", 180, Orange, 100, [14, 70, 200, 550, 750, 950]),
        Square::plain("Community Chest"),
        street("Tennessee Avenue", 180, Orange, 100, [14, 70, 200, 550, 750, 950]),
        street("New York Avenue", 200, Orange, 100, [16, 80, 220, 600, 800, 1000]),
        Square::plain("Free Parking"),
        street("Kentucky Avenue", 220, Red, 150, [18, 90, 250, 700, 875, 1050]),
        Square::plain("Chance"),
        street("Indiana Avenue", 220, Red, 150, [18, 90, 250, 700, 875, 1050]),
        street("Illinois Avenue", 240, Red, 150, [20, 100, 300, 750, 925, 1100]),
        railroad("B. & O. Railroad"),
        street("Atlantic Avenue", 260, Yellow, 150, [22, 110, 330, 800, 975, 1150]),
        street("Ventnor Avenue", 260, Yellow, 150, [22, 110, 330, 800, 975, 1150]),
        utility("Water Works"),
        street("Marvin Gardens", 280, Yellow, 150, [24, 120, 360, 850, 1025, 1200]),
        Square::plain("Go to Jail"),
        street("Pacific Avenue", 300, Green, 200, [26, 130, 390, 900, 1100, 1275]),
        street("North Carolina Avenue", 300, Green, 200, [26, 130, 390, 900, 1100, 1275]),
        Square::plain("Community Chest"),
        street("Pennsylvania Avenue", 320, Green, 200, [28, 150, 450, 1000, 1200, 1400]),
        railroad("Short Line"),
        Square::plain("Chance"),
        street("Park Place", 350, DarkBlue, 200, [35, 175, 500, 1100, 1300, 1500]),
        Square::plain("Luxury Tax"),
        street("Boardwalk", 400, DarkBlue, 200, [50, 200, 600, 1400, 1700, 2000]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::board::BOARD_SIZE;

    #[test]
    fn board_has_forty_squares_and_full_groups() {
        let squares = standard_squares();
        assert_eq!(squares.len(), BOARD_SIZE);
        let count = |group| squares.iter().filter(|sq| sq.group == Some(group)).count();
        assert_eq!(count(Group::Purple), 2);
        assert_eq!(count(Group::DarkBlue), 2);
        assert_eq!(count(Group::Railroad), 4);
        assert_eq!(count(Group::Utility), 2);
        for group in [Group::LightBlue, Group::Pink, Group::Orange, Group::Red] {
            assert_eq!(count(group), 3, "{group:?}");
        }
        assert_eq!(squares[GO_TO_JAIL_SQUARE].name, "Go to Jail");
        assert!(TAXES.iter().all(|(i, _)| !squares[*i].is_purchasable()));
    }
}
