use ahash::AHashMap as HashMap;
use anyhow::{anyhow, bail, Result};
use csv::ReaderBuilder;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Career batting totals for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(alias = "playerID")]
    pub player_id: String,
    #[serde(alias = "H")]
    pub hits: u64,
    #[serde(alias = "AB")]
    pub at_bats: u64,
}

impl PlayerRecord {
    pub fn new(player_id: &str, hits: u64, at_bats: u64) -> Self {
        Self {
            player_id: player_id.to_string(),
            hits,
            at_bats,
        }
    }

    pub fn raw_average(&self) -> f64 {
        self.hits as f64 / self.at_bats as f64
    }

    pub fn validate(&self) -> Result<()> {
        if self.at_bats == 0 {
            bail!("Player {} has no at-bats", self.player_id);
        }
        if self.hits > self.at_bats {
            bail!(
                "Player {} has more hits ({}) than at-bats ({})",
                self.player_id,
                self.hits,
                self.at_bats
            );
        }
        Ok(())
    }
}

/// Anything carrying a (hits, at-bats) pair that a prior can be fit to.
pub trait BattingCounts {
    fn player_id(&self) -> &str;
    fn hits(&self) -> u64;
    fn at_bats(&self) -> u64;

    /// The true batting average, when the counts were simulated from one.
    fn true_p(&self) -> Option<f64> {
        None
    }
}

impl BattingCounts for PlayerRecord {
    fn player_id(&self) -> &str {
        &self.player_id
    }

    fn hits(&self) -> u64 {
        self.hits
    }

    fn at_bats(&self) -> u64 {
        self.at_bats
    }
}

/// Tab for `.tsv`/`.tab` files, comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Read player rows and sum rows sharing a player id into career totals.
///
/// First-appearance order of player ids is kept. Players with fewer than
/// `min_at_bats` career at-bats are dropped after validation.
pub fn read_players<R: Read>(
    reader: R,
    delimiter: u8,
    min_at_bats: u64,
) -> Result<Vec<PlayerRecord>> {
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut careers: Vec<PlayerRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut n_rows = 0;
    for (line, row) in csv_reader.deserialize::<PlayerRecord>().enumerate() {
        let row = row.map_err(|e| anyhow!("Could not parse player row {}: {}", line + 1, e))?;
        n_rows += 1;
        match index.get(&row.player_id) {
            Some(&i) => {
                careers[i].hits += row.hits;
                careers[i].at_bats += row.at_bats;
            }
            None => {
                index.insert(row.player_id.clone(), careers.len());
                careers.push(row);
            }
        }
    }
    debug!("Read {} rows for {} players", n_rows, careers.len());

    for record in &careers {
        record.validate()?;
    }
    let n_players = careers.len();
    careers.retain(|r| r.at_bats >= min_at_bats);
    if careers.len() < n_players {
        info!(
            "Dropped {} players with fewer than {} at-bats",
            n_players - careers.len(),
            min_at_bats
        );
    }
    if careers.is_empty() {
        bail!("No players left to analyse");
    }
    Ok(careers)
}

pub fn load_players(path: &Path, min_at_bats: u64) -> Result<Vec<PlayerRecord>> {
    let file = File::open(path)
        .map_err(|e| anyhow!("Could not open player file: {} ({})", path.display(), e))?;
    let players = read_players(file, delimiter_for(path), min_at_bats)?;
    info!("Loaded {} players from {}", players.len(), path.display());
    Ok(players)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::NamedTempFile;

    fn create_temp_file(data: &[u8], suffix: &str) -> NamedTempFile {
        let mut temp_file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("Failed to create temp file");
        temp_file.write_all(data).expect("Failed to write data");
        temp_file
            .seek(SeekFrom::Start(0))
            .expect("Failed to seek to start");
        temp_file
    }

    #[test]
    fn test_read_players_csv() {
        let data = "player_id,hits,at_bats\naaronha01,3771,12364\nbondsba01,2935,9847\n";
        let players = read_players(data.as_bytes(), b',', 1).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0], PlayerRecord::new("aaronha01", 3771, 12364));
        assert_eq!(players[1].player_id, "bondsba01");
    }

    #[test]
    fn test_read_players_lahman_headers() {
        let data = "playerID\tH\tAB\ncobbty01\t4189\t11434\n";
        let players = read_players(data.as_bytes(), b'\t', 1).unwrap();
        assert_eq!(players, vec![PlayerRecord::new("cobbty01", 4189, 11434)]);
    }

    #[test]
    fn test_seasons_are_summed_into_careers() {
        let data = "player_id,hits,at_bats\nx,10,40\ny,1,3\nx,20,60\n";
        let players = read_players(data.as_bytes(), b',', 1).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0], PlayerRecord::new("x", 30, 100));
        assert_eq!(players[1], PlayerRecord::new("y", 1, 3));
    }

    #[test]
    fn test_min_at_bats_filter() {
        let data = "player_id,hits,at_bats\nx,30,100\ny,1,3\n";
        let players = read_players(data.as_bytes(), b',', 10).unwrap();
        assert_eq!(players, vec![PlayerRecord::new("x", 30, 100)]);
        assert!(read_players(data.as_bytes(), b',', 1000).is_err());
    }

    #[test]
    fn test_zero_at_bats_is_an_error() {
        let data = "player_id,hits,at_bats\nx,0,0\n";
        assert!(read_players(data.as_bytes(), b',', 0).is_err());
    }

    #[test]
    fn test_more_hits_than_at_bats_is_an_error() {
        let data = "player_id,hits,at_bats\nx,11,10\n";
        assert!(read_players(data.as_bytes(), b',', 1).is_err());
    }

    #[test]
    fn test_malformed_row_is_an_error() {
        let data = "player_id,hits,at_bats\nx,abc,10\n";
        assert!(read_players(data.as_bytes(), b',', 1).is_err());
    }

    #[test]
    fn test_load_players_from_tsv_file() {
        let tempfile = create_temp_file(b"playerID\tH\tAB\nx\t3\t10\n", ".tsv");
        let players = load_players(tempfile.path(), 1).unwrap();
        assert_eq!(players, vec![PlayerRecord::new("x", 3, 10)]);
    }

    #[test]
    fn test_delimiter_for() {
        assert_eq!(delimiter_for(Path::new("careers.tsv")), b'\t');
        assert_eq!(delimiter_for(Path::new("careers.csv")), b',');
        assert_eq!(delimiter_for(Path::new("careers")), b',');
    }

    #[test]
    fn test_raw_average() {
        assert_eq!(PlayerRecord::new("x", 3, 12).raw_average(), 0.25);
    }
}
