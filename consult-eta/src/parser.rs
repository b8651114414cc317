use crate::types::{BoardBlock, ClinicSnapshot, PatientRecord, PatientStatus, TimeSlot};
use chrono::{Datelike, NaiveDateTime, Timelike};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Footer phrases of the board modal. Everything from the first one on is
/// legend, disclaimer or button text.
const CUT_MARKERS: [&str; 6] = ["狀態說明", "※實際看診", "門診看診時間預估", "離開", "報到時間", "重整"];

const DOCTOR_MARKER: &str = "醫師";
const LOCATION_MARKER: &str = "地點";
const CURRENT_NUMBER_MARKER: &str = "目前叫號";
const WAITING_MARKER: &str = "等待人數";
const COMPLETED_MARKER: &str = "完診人數";
const SESSION_ENDED_MARKER: &str = "結束看診";

/// Ended sessions are keyed under the morning slot whatever the capture hour.
pub const SESSION_ENDED_SLOT: TimeSlot = TimeSlot::Morning;

static ROOM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+診").expect("Invalid room pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterState {
    SeekingNumber,
    SeekingStatus(u32),
}

/// Pairs a bare number line with the status line right after it. Lines that
/// do not fit the pattern are skipped without losing sync.
#[derive(Debug)]
pub struct RosterScanner {
    state: RosterState,
    records: Vec<PatientRecord>,
}

impl RosterScanner {
    pub fn new() -> Self {
        Self {
            state: RosterState::SeekingNumber,
            records: Vec::new(),
        }
    }

    pub fn state(&self) -> RosterState {
        self.state
    }

    pub fn feed(&mut self, token: &str) {
        let token = token.trim();
        self.state = match self.state {
            RosterState::SeekingNumber => match parse_patient_number(token) {
                Some(number) => RosterState::SeekingStatus(number),
                None => RosterState::SeekingNumber,
            },
            RosterState::SeekingStatus(number) => {
                if let Some(status) = PatientStatus::from_label(token) {
                    self.records.push(PatientRecord { number, status });
                    RosterState::SeekingNumber
                } else if let Some(next) = parse_patient_number(token) {
                    // the pending number had no status; this line may start a new pair
                    RosterState::SeekingStatus(next)
                } else {
                    RosterState::SeekingNumber
                }
            }
        };
    }

    /// Records in board order, one per number. A repeated number keeps its
    /// first position and takes the status seen last.
    pub fn finish(self) -> Vec<PatientRecord> {
        let mut positions: HashMap<u32, usize> = HashMap::new();
        let mut unique: Vec<PatientRecord> = Vec::with_capacity(self.records.len());

        for record in self.records {
            match positions.get(&record.number) {
                Some(&index) => {
                    debug!("Roster repeats number {}, keeping last status", record.number);
                    unique[index].status = record.status;
                }
                None => {
                    positions.insert(record.number, unique.len());
                    unique.push(record);
                }
            }
        }

        unique
    }
}

impl Default for RosterScanner {
    fn default() -> Self {
        Self::new()
    }
}

pub fn scan_roster<'a, I>(lines: I) -> Vec<PatientRecord>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scanner = RosterScanner::new();
    for line in lines {
        scanner.feed(line);
    }
    scanner.finish()
}

/// Keeps the header and roster, dropping everything from the earliest
/// boilerplate marker on.
pub fn truncate_boilerplate(text: &str) -> &str {
    let cut = CUT_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker))
        .min();

    match cut {
        Some(position) => text[..position].trim(),
        None => text.trim(),
    }
}

/// Splits "中醫內科3診" into ("中醫內科", "3診"). Names without a room
/// designator come back unchanged with an empty room.
pub fn split_display_name(display_name: &str) -> (String, String) {
    match ROOM_PATTERN.find(display_name) {
        Some(found) => {
            let room = found.as_str().to_string();
            let department = display_name.replacen(&room, "", 1).trim().to_string();
            (department, room)
        }
        None => (display_name.to_string(), String::new()),
    }
}

fn parse_patient_number(token: &str) -> Option<u32> {
    parse_count(token).filter(|number| *number > 0)
}

fn parse_count(token: &str) -> Option<u32> {
    let token = token.trim();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

#[derive(Debug, Default)]
struct BoardHeader {
    doctor: String,
    location: String,
    current: String,
    waiting: String,
    completed: String,
}

impl BoardHeader {
    fn scan(lines: &[&str]) -> Self {
        let mut header = BoardHeader::default();
        let next_value = |i: usize| lines.get(i + 1).map(|l| l.trim().to_string()).unwrap_or_default();

        for (i, line) in lines.iter().enumerate() {
            if line.contains(DOCTOR_MARKER) {
                header.doctor = line.replace(DOCTOR_MARKER, "").trim().to_string();
            } else if line.contains(LOCATION_MARKER) {
                header.location = next_value(i);
            } else if line.contains(CURRENT_NUMBER_MARKER) {
                header.current = next_value(i);
            } else if line.contains(WAITING_MARKER) {
                header.waiting = next_value(i);
            } else if line.contains(COMPLETED_MARKER) {
                header.completed = next_value(i);
            }
        }

        header
    }

    fn has_counters(&self) -> bool {
        !(self.current.is_empty() && self.waiting.is_empty() && self.completed.is_empty())
    }
}

/// Turns raw board blocks into snapshots. Parsing never fails: anything it
/// cannot read degrades to empty or zero and is counted as an anomaly.
pub struct SnapshotParser {
    parsed: usize,
    anomalies: usize,
}

impl SnapshotParser {
    pub fn new() -> Self {
        Self { parsed: 0, anomalies: 0 }
    }

    pub fn parse_block(&mut self, block: &BoardBlock, captured_at: NaiveDateTime) -> ClinicSnapshot {
        self.parsed += 1;

        let ended = block
            .status_text
            .as_deref()
            .is_some_and(|status| status.contains(SESSION_ENDED_MARKER));
        if ended {
            return self.session_ended(block, captured_at);
        }

        let text = truncate_boilerplate(&block.text);
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let header = BoardHeader::scan(&lines);

        if header.doctor.is_empty() {
            self.anomalies += 1;
            warn!("No doctor line on board block '{}'", block.display_name);
        }
        if !header.has_counters() {
            self.anomalies += 1;
            warn!("No queue counters on board block '{}'", block.display_name);
        }

        let (department, clinic_room) = split_display_name(&block.display_name);
        let patients = scan_roster(lines.iter().copied());

        debug!(
            "Parsed {} {} {}: {} patients on roster",
            department,
            clinic_room,
            header.doctor,
            patients.len()
        );

        ClinicSnapshot {
            department,
            clinic_room,
            doctor: header.doctor,
            location: Some(header.location).filter(|l| !l.is_empty()),
            current_number: parse_count(&header.current).unwrap_or(0),
            waiting_count: parse_count(&header.waiting).unwrap_or(0),
            completed_count: parse_count(&header.completed).unwrap_or(0),
            captured_at,
            time_slot: TimeSlot::from_hour(captured_at.hour()),
            weekday: captured_at.weekday().num_days_from_monday(),
            session_ended: false,
            patients,
        }
    }

    fn session_ended(&self, block: &BoardBlock, captured_at: NaiveDateTime) -> ClinicSnapshot {
        // collapsed layout: the name sits on the line below the marker
        let lines: Vec<&str> = block.text.lines().map(str::trim).collect();
        let doctor = lines
            .iter()
            .position(|line| line.contains(DOCTOR_MARKER))
            .and_then(|i| lines.get(i + 1))
            .map(|name| name.to_string())
            .unwrap_or_default();

        let (department, clinic_room) = split_display_name(&block.display_name);
        debug!("Session ended for {} {} {}", department, clinic_room, doctor);

        ClinicSnapshot {
            department,
            clinic_room,
            doctor,
            location: None,
            current_number: 0,
            waiting_count: 0,
            completed_count: 0,
            captured_at,
            time_slot: SESSION_ENDED_SLOT,
            weekday: captured_at.weekday().num_days_from_monday(),
            session_ended: true,
            patients: Vec::new(),
        }
    }

    /// (blocks parsed, anomalies seen) since the last reset
    pub fn get_stats(&self) -> (usize, usize) {
        (self.parsed, self.anomalies)
    }

    pub fn reset_stats(&mut self) {
        self.parsed = 0;
        self.anomalies = 0;
    }
}

impl Default for SnapshotParser {
    fn default() -> Self {
        Self::new()
    }
}
