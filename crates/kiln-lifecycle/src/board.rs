use serde::Serialize;

use kiln_types::{EntityId, Piece, Stage};

/// One row of the board.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoardCard {
    pub id: EntityId,
    pub name: String,
    pub photo_count: usize,
}

impl From<&Piece> for BoardCard {
    fn from(piece: &Piece) -> Self {
        Self {
            id: piece.id,
            name: piece.name.clone(),
            photo_count: piece.media.len(),
        }
    }
}

/// One column of the board: every piece currently at `stage`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoardColumn {
    pub stage: Stage,
    pub pieces: Vec<BoardCard>,
}

impl BoardColumn {
    pub fn count(&self) -> usize {
        self.pieces.len()
    }
}

/// Pieces grouped by current stage, one column per stage in stage order.
/// Empty stages still get a column.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageBoard {
    pub columns: Vec<BoardColumn>,
}

impl StageBoard {
    pub fn build<'a>(pieces: impl IntoIterator<Item = &'a Piece>) -> Self {
        let mut columns: Vec<BoardColumn> = Stage::ALL
            .iter()
            .map(|stage| BoardColumn {
                stage: *stage,
                pieces: Vec::new(),
            })
            .collect();
        for piece in pieces {
            columns[piece.current_stage().index()]
                .pieces
                .push(BoardCard::from(piece));
        }
        for column in &mut columns {
            column.pieces.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Self { columns }
    }

    pub fn column(&self, stage: Stage) -> &BoardColumn {
        &self.columns[stage.index()]
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(BoardColumn::count).sum()
    }
}
