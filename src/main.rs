//! Command-line front-end: create, extract and detect payloads in PNG and
//! ICO files.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use pngstash::cli::Detection;
use pngstash::png::{Text, ZText};
use pngstash::utils;
use pngstash::{IcoPayload, PngPayload, StashError, StashResult};

fn status_normal(message: impl Display) {
    println!("[+] {message}");
}

fn status_alert(message: impl Display) {
    println!("[!] {message}");
}

fn status_error(message: impl Display) {
    eprintln!("[-] {message}");
}

/// The file being operated on: a bare PNG, or an ICO wrapping one.
enum Carrier {
    Png(PngPayload),
    Ico(IcoPayload),
}

impl Carrier {
    /// Parse as PNG first; on a signature mismatch, fall back to ICO.
    fn open(path: &Path, quiet: bool) -> StashResult<Self> {
        match PngPayload::from_file(path, true) {
            Ok(png) => {
                if !quiet {
                    status_alert("Image parsed!");
                }

                Ok(Carrier::Png(png))
            }
            Err(StashError::BadSignature) => {
                if !quiet {
                    status_normal("Not a PNG image. Trying to parse as icon with embedded PNG...");
                }

                let ico = IcoPayload::from_file(path, true)?;

                if !quiet {
                    status_alert("Icon parsed!");
                }

                Ok(Carrier::Ico(ico))
            }
            Err(err) => Err(err),
        }
    }

    fn payload(&self) -> &PngPayload {
        match self {
            Carrier::Png(png) => png,
            Carrier::Ico(ico) => ico.png_payload(),
        }
    }

    fn payload_mut(&mut self) -> &mut PngPayload {
        match self {
            Carrier::Png(png) => png,
            Carrier::Ico(ico) => ico.png_payload_mut(),
        }
    }

    fn replace_payload(&mut self, payload: PngPayload) {
        match self {
            Carrier::Png(png) => *png = payload,
            Carrier::Ico(ico) => ico.set_png_payload(payload),
        }
    }

    fn save(&self, path: &Path) -> StashResult<()> {
        match self {
            Carrier::Png(png) => png.save(path),
            Carrier::Ico(ico) => ico.save(path),
        }
    }
}

#[derive(Parser)]
#[command(name = "pngstash", version)]
#[command(about = "Hide, extract and detect payloads in PNG and ICO images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a payload-filled PNG file
    Create {
        /// The PNG (or ICO with an embedded PNG) to add payloads to
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the resulting file
        #[arg(short, long)]
        output: PathBuf,

        /// File whose bytes are appended as trailing data
        #[arg(short = 'd', long = "trailing-data-payload", value_name = "FILE")]
        trailing_data: Option<PathBuf>,

        /// Keyword and file to embed as a tEXt payload; repeatable
        #[arg(short = 't', long = "text-payload", num_args = 2,
              value_names = ["KEYWORD", "FILE"], action = ArgAction::Append)]
        text: Vec<String>,

        /// Keyword and file to embed as a zTXt payload; repeatable
        #[arg(short = 'z', long = "ztext-payload", num_args = 2,
              value_names = ["KEYWORD", "FILE"], action = ArgAction::Append)]
        ztext: Vec<String>,

        /// File to weave into the pixels with basic steganography
        #[arg(short = 's', long = "stego-payload", value_name = "FILE")]
        stego: Option<PathBuf>,
    },

    /// Retrieve payloads from an encoded PNG file
    Extract {
        /// The file to extract payloads from
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory; extracted artifacts are written here
        #[arg(short, long)]
        output: PathBuf,

        /// Try every technique (the default when none is selected)
        #[arg(short, long)]
        all: bool,

        /// Extract the trailing data payload
        #[arg(short = 'd', long = "trailing-data-payload")]
        trailing_data: bool,

        /// Keyword of the tEXt payloads to extract
        #[arg(short = 't', long = "text-payload", value_name = "KEYWORD")]
        text: Option<String>,

        /// Keyword of the zTXt payloads to extract
        #[arg(short = 'z', long = "ztext-payload", value_name = "KEYWORD")]
        ztext: Option<String>,

        /// Extract the steganographic payload
        #[arg(short = 's', long = "stego-payload")]
        stego: bool,
    },

    /// Detect which payload techniques are present in a file
    Detect {
        /// The file to scan
        filename: PathBuf,

        /// Check every technique (the default when none is selected)
        #[arg(short, long)]
        auto_detect: bool,

        /// Print only a comma-separated report on stdout
        #[arg(short, long)]
        minimal: bool,

        /// Check for trailing data
        #[arg(short = 'd', long = "trailing-data")]
        trailing_data: bool,

        /// Check for tEXt payloads, optionally under one keyword
        #[arg(short = 't', long = "text-data", value_name = "KEYWORD",
              num_args = 0..=1, default_missing_value = "")]
        text: Option<String>,

        /// Check for zTXt payloads, optionally under one keyword
        #[arg(short = 'z', long = "ztext-data", value_name = "KEYWORD",
              num_args = 0..=1, default_missing_value = "")]
        ztext: Option<String>,

        /// Check for a steganographic payload
        #[arg(short = 's', long = "stego-data")]
        stego: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Create {
            input,
            output,
            trailing_data,
            text,
            ztext,
            stego,
        } => run_create(&input, &output, trailing_data, &text, &ztext, stego),
        Commands::Extract {
            input,
            output,
            all,
            trailing_data,
            text,
            ztext,
            stego,
        } => run_extract(&input, &output, all, trailing_data, text, ztext, stego),
        Commands::Detect {
            filename,
            auto_detect,
            minimal,
            trailing_data,
            text,
            ztext,
            stego,
        } => run_detect(&filename, auto_detect, minimal, trailing_data, text, ztext, stego),
    };

    ExitCode::from(code)
}

fn run_create(
    input: &Path,
    output: &Path,
    trailing_data: Option<PathBuf>,
    text: &[String],
    ztext: &[String],
    stego: Option<PathBuf>,
) -> u8 {
    status_normal("Creating a new payload!");
    status_normal(format!("-> input file:  {}", input.display()));
    status_normal(format!("-> output file: {}", output.display()));

    if trailing_data.is_none() && text.is_empty() && ztext.is_empty() && stego.is_none() {
        status_error("No payload type specified.");
        return 1;
    }

    status_normal(format!("Parsing {}...", input.display()));

    let mut carrier = match Carrier::open(input, false) {
        Ok(carrier) => carrier,
        Err(err) => {
            status_error(format!("Failed to load input file: {err}"));
            return 2;
        }
    };

    if let Some(trailing_file) = trailing_data {
        status_normal(format!("Adding trailing data payload to {}...", input.display()));

        let data = match utils::read_file(&trailing_file) {
            Ok(data) => data,
            Err(err) => {
                status_error(format!("-> Failed to load payload: {err}"));
                return 3;
            }
        };

        carrier.payload_mut().set_trailing_data(data);
        status_alert("Trailing data payload set!");
    }

    for (number, pair) in text.chunks(2).enumerate() {
        let (keyword, payload_file) = (&pair[0], &pair[1]);

        status_normal(format!("-> Processing tEXt payload {}...", number + 1));
        status_normal(format!("---> Keyword: {keyword}"));
        status_normal(format!("---> Payload: {payload_file}"));

        let data = match utils::read_file(Path::new(payload_file)) {
            Ok(data) => data,
            Err(err) => {
                status_error(format!("---> Failed to read payload: {err}"));
                return 4;
            }
        };

        if let Err(err) = carrier.payload_mut().add_text_payload(keyword, &data) {
            status_error(format!("---> Failed to add payload: {err}"));
            return 5;
        }

        status_alert(format!("-> Payload {} processed.", number + 1));
    }

    for (number, pair) in ztext.chunks(2).enumerate() {
        let (keyword, payload_file) = (&pair[0], &pair[1]);

        status_normal(format!("-> Processing zTXt payload {}...", number + 1));
        status_normal(format!("---> Keyword: {keyword}"));
        status_normal(format!("---> Payload: {payload_file}"));

        let data = match utils::read_file(Path::new(payload_file)) {
            Ok(data) => data,
            Err(err) => {
                status_error(format!("---> Failed to read payload: {err}"));
                return 6;
            }
        };

        if let Err(err) = carrier.payload_mut().add_ztext_payload(keyword, &data) {
            status_error(format!("---> Failed to add payload: {err}"));
            return 7;
        }

        status_alert(format!("-> Payload {} processed.", number + 1));
    }

    if let Some(stego_file) = stego {
        status_normal(format!("Adding steganographic payload to {}...", input.display()));

        let data = match utils::read_file(&stego_file) {
            Ok(data) => data,
            Err(err) => {
                status_error(format!("-> Failed to read payload file: {err}"));
                return 8;
            }
        };

        status_normal("-> Creating stego payload...");
        status_normal("-> This may take a moment, depending on the size of the image in pixels.");

        match carrier.payload().create_stego_payload(&data) {
            Ok(stego_payload) => carrier.replace_payload(stego_payload),
            Err(err) => {
                status_error(format!("Failed to create stego payload: {err}"));
                return 8;
            }
        }

        status_alert("Stego payload created!");
    }

    status_normal(format!("Saving payload to {}...", output.display()));

    if let Err(err) = carrier.save(output) {
        status_error(format!("Failed to save payload: {err}"));
        return 9;
    }

    status_alert("Payload saved!");

    0
}

/// Write one extracted payload as `<keyword>.NNNN.bin` in `output`.
fn write_keyword_payload(
    output: &Path,
    sequence: &mut HashMap<String, usize>,
    keyword: &str,
    data: &[u8],
) -> StashResult<PathBuf> {
    let counter = sequence.entry(keyword.to_string()).or_insert(0);
    *counter += 1;

    let path = output.join(format!("{keyword}.{counter:04}.bin"));
    utils::write_file(&path, data)?;

    Ok(path)
}

fn run_extract(
    input: &Path,
    output: &Path,
    all: bool,
    trailing_data: bool,
    text: Option<String>,
    ztext: Option<String>,
    stego: bool,
) -> u8 {
    status_normal("Attempting to extract payloads!");
    status_normal(format!("-> input file:       {}", input.display()));
    status_normal(format!("-> output directory: {}", output.display()));

    status_normal(format!("Parsing {}...", input.display()));

    let mut carrier = match Carrier::open(input, false) {
        Ok(carrier) => carrier,
        Err(err) => {
            status_error(format!("Failed to load input file: {err}"));
            return 1;
        }
    };

    let all_techniques = all || (!trailing_data && text.is_none() && ztext.is_none() && !stego);

    if all_techniques {
        status_normal("Attempting to extract all techniques.");
    }

    let mut payloads_found = 0usize;
    let mut sequence: HashMap<String, usize> = HashMap::new();

    if all_techniques || trailing_data {
        status_normal("Searching for trailing data...");

        if carrier.payload().has_trailing_data() {
            status_alert("Trailing data found!");

            let data = carrier
                .payload()
                .get_trailing_data()
                .map(|data| data.to_vec())
                .unwrap_or_default();
            status_normal(format!("Trailing data size: {}", data.len()));

            let path = output.join("trailing_data.bin");
            status_normal(format!("Saving trailing data to {}...", path.display()));

            if let Err(err) = utils::write_file(&path, &data) {
                status_error(format!("Failed to save trailing data: {err}"));
                return 2;
            }

            status_alert("Payload extracted!");
            payloads_found += 1;
        } else if all_techniques {
            status_normal("No trailing data found.");
        } else {
            status_error("No trailing data found.");
            return 3;
        }
    }

    if all_techniques || text.is_some() {
        match &text {
            // Scan mode: every tEXt chunk with a base64 body is a payload.
            None => {
                if carrier.payload().has_chunk("tEXt") {
                    status_normal("Scanning tEXt sections for possible payloads...");

                    let chunks = carrier.payload().get_chunks("tEXt").unwrap_or_default();

                    for chunk in chunks {
                        let section = Text::from_chunk(chunk);

                        let keyword = match section.keyword() {
                            Ok(keyword) => keyword,
                            Err(err) => {
                                status_error(format!("Malformed tEXt section: {err}"));
                                return 4;
                            }
                        };

                        let body = section.text();

                        if !utils::is_base64_string(&body) {
                            status_normal(format!(
                                "Chunk with keyword \"{keyword}\" is not a payload."
                            ));
                            continue;
                        }

                        status_alert(format!("Found payload with keyword \"{keyword}\"!"));

                        let decoded = match utils::base64_decode(&body) {
                            Ok(decoded) => decoded,
                            Err(err) => {
                                status_error(format!("Failed to decode payload: {err}"));
                                return 4;
                            }
                        };

                        match write_keyword_payload(output, &mut sequence, &keyword, &decoded) {
                            Ok(path) => {
                                status_normal(format!("Saved payload to {}", path.display()));
                                payloads_found += 1;
                            }
                            Err(err) => {
                                status_error(format!("Failed to write file: {err}"));
                                return 5;
                            }
                        }
                    }
                } else {
                    status_normal("No tEXt sections found to scan.");
                }
            }
            Some(keyword) => {
                if !carrier.payload().has_chunk("tEXt") {
                    status_error("No tEXt sections found in input.");
                    return 6;
                }

                status_normal(format!(
                    "Attempting to extract payloads with keyword \"{keyword}\"..."
                ));

                let extracted = match carrier.payload().extract_text_payloads(keyword) {
                    Ok(extracted) => extracted,
                    Err(err) => {
                        status_error(format!("Failed to extract payloads: {err}"));
                        return 8;
                    }
                };

                if extracted.is_empty() {
                    status_error("No payloads found.");
                    return 7;
                }

                status_alert(format!("Found {} payload(s)!", extracted.len()));

                for data in extracted {
                    match write_keyword_payload(output, &mut sequence, keyword, &data) {
                        Ok(path) => {
                            status_normal(format!("Saved payload to {}", path.display()));
                            payloads_found += 1;
                        }
                        Err(err) => {
                            status_error(format!("Failed to write file: {err}"));
                            return 9;
                        }
                    }
                }
            }
        }
    }

    if all_techniques || ztext.is_some() {
        match &ztext {
            None => {
                if carrier.payload().has_chunk("zTXt") {
                    status_normal("Scanning zTXt sections for possible payloads...");

                    let chunks = carrier.payload().get_chunks("zTXt").unwrap_or_default();

                    for chunk in chunks {
                        let section = ZText::from_chunk(chunk);

                        let keyword = match section.keyword() {
                            Ok(keyword) => keyword,
                            Err(err) => {
                                status_error(format!("Malformed zTXt section: {err}"));
                                return 10;
                            }
                        };

                        let body = match section.text() {
                            Ok(body) => body,
                            Err(err) => {
                                status_error(format!("Failed to decompress: {err}"));
                                return 10;
                            }
                        };

                        if !utils::is_base64_string(&body) {
                            status_normal(format!(
                                "Chunk with keyword \"{keyword}\" is not a payload."
                            ));
                            continue;
                        }

                        status_alert(format!("Found payload with keyword \"{keyword}\"!"));

                        let decoded = match utils::base64_decode(&body) {
                            Ok(decoded) => decoded,
                            Err(err) => {
                                status_error(format!("Failed to decode payload: {err}"));
                                return 10;
                            }
                        };

                        match write_keyword_payload(output, &mut sequence, &keyword, &decoded) {
                            Ok(path) => {
                                status_normal(format!("Saved payload to {}", path.display()));
                                payloads_found += 1;
                            }
                            Err(err) => {
                                status_error(format!("Failed to write file: {err}"));
                                return 11;
                            }
                        }
                    }
                } else {
                    status_normal("No zTXt sections found to scan.");
                }
            }
            Some(keyword) => {
                if !carrier.payload().has_chunk("zTXt") {
                    status_error("No zTXt sections found in input.");
                    return 12;
                }

                status_normal(format!(
                    "Attempting to extract payloads with keyword \"{keyword}\"..."
                ));

                let extracted = match carrier.payload().extract_ztext_payloads(keyword) {
                    Ok(extracted) => extracted,
                    Err(err) => {
                        status_error(format!("Failed to extract payloads: {err}"));
                        return 14;
                    }
                };

                if extracted.is_empty() {
                    status_error("No payloads found.");
                    return 13;
                }

                status_alert(format!("Found {} payload(s)!", extracted.len()));

                for data in extracted {
                    match write_keyword_payload(output, &mut sequence, keyword, &data) {
                        Ok(path) => {
                            status_normal(format!("Saved payload to {}", path.display()));
                            payloads_found += 1;
                        }
                        Err(err) => {
                            status_error(format!("Failed to write file: {err}"));
                            return 15;
                        }
                    }
                }
            }
        }
    }

    if all_techniques || stego {
        status_normal("Loading input to check for stego data...");

        if let Err(err) = carrier.payload_mut().load() {
            status_error(format!("Failed to load payload: {err}"));
            return 16;
        }

        if carrier.payload().has_stego_payload() {
            status_alert("Found stego payload!");
            status_normal("Attempting to decode stego data...");

            let data = match carrier.payload().extract_stego_payload() {
                Ok(data) => data,
                Err(err) => {
                    status_error(format!("Failed to extract stego payload: {err}"));
                    return 17;
                }
            };

            let path = output.join("stego_payload.bin");
            status_normal(format!("Saving stego payload to {}...", path.display()));

            if let Err(err) = utils::write_file(&path, &data) {
                status_error(format!("Failed to save stego data: {err}"));
                return 18;
            }

            status_alert("Stego data saved!");
            payloads_found += 1;
        } else if all_techniques {
            status_normal("No stego payload found.");
        } else {
            status_error("No stego payload found.");
            return 19;
        }
    }

    status_normal(format!(
        "Extraction techniques exhausted. Found {payloads_found} payload(s)."
    ));

    0
}

fn run_detect(
    filename: &Path,
    auto_detect: bool,
    minimal: bool,
    trailing_data: bool,
    text: Option<String>,
    ztext: Option<String>,
    stego: bool,
) -> u8 {
    if !minimal {
        status_normal("Detecting possible payloads in PNG file!");
        status_normal(format!("-> input: {}", filename.display()));
    }

    let auto = auto_detect || (!trailing_data && text.is_none() && ztext.is_none() && !stego);

    if auto && !minimal {
        status_normal("Automatically detecting all techniques.");
    }

    let mut carrier = match Carrier::open(filename, minimal) {
        Ok(carrier) => carrier,
        Err(err) => {
            if !minimal {
                status_error(format!("Failed to load input file: {err}"));
            }

            return 1;
        }
    };

    let mut report: Vec<Detection> = Vec::new();

    if auto || trailing_data {
        if !minimal {
            status_normal("Checking for trailing data...");
        }

        if carrier.payload().has_trailing_data() {
            if !minimal {
                status_alert("Trailing data found!");
            }

            report.push(Detection::TrailingData);
        } else if !minimal {
            status_normal("No trailing data found.");
        }
    }

    if auto || text.is_some() {
        if !minimal {
            status_normal("Checking for tEXt payloads...");
        }

        let keyword_filter = text.unwrap_or_default();

        if carrier.payload().has_chunk("tEXt") {
            let chunks = carrier.payload().get_chunks("tEXt").unwrap_or_default();

            for chunk in chunks {
                let section = Text::from_chunk(chunk);

                let keyword = match section.keyword() {
                    Ok(keyword) => keyword,
                    Err(err) => {
                        if !minimal {
                            status_error(format!("Malformed tEXt section: {err}"));
                        }

                        return 2;
                    }
                };

                if !keyword_filter.is_empty() && keyword != keyword_filter {
                    continue;
                }

                if utils::is_base64_string(&section.text()) {
                    if !minimal {
                        status_alert(format!("Found payload keyword in tEXt: {keyword}"));
                    }

                    report.push(Detection::Text(keyword));
                }
            }
        } else if !minimal {
            status_normal("No tEXt sections present.");
        }
    }

    if auto || ztext.is_some() {
        if !minimal {
            status_normal("Checking for zTXt payloads...");
        }

        let keyword_filter = ztext.unwrap_or_default();

        if carrier.payload().has_chunk("zTXt") {
            let chunks = carrier.payload().get_chunks("zTXt").unwrap_or_default();

            for chunk in chunks {
                let section = ZText::from_chunk(chunk);

                let keyword = match section.keyword() {
                    Ok(keyword) => keyword,
                    Err(err) => {
                        if !minimal {
                            status_error(format!("Malformed zTXt section: {err}"));
                        }

                        return 2;
                    }
                };

                if !keyword_filter.is_empty() && keyword != keyword_filter {
                    continue;
                }

                let body = match section.text() {
                    Ok(body) => body,
                    Err(err) => {
                        if !minimal {
                            status_error(format!("Decompression failed: {err}"));
                        }

                        return 2;
                    }
                };

                if utils::is_base64_string(&body) {
                    if !minimal {
                        status_alert(format!("Found payload keyword in zTXt: {keyword}"));
                    }

                    report.push(Detection::ZText(keyword));
                }
            }
        } else if !minimal {
            status_normal("No zTXt sections present.");
        }
    }

    if auto || stego {
        if !minimal {
            status_normal("Checking for stego payload...");
        }

        if let Err(err) = carrier.payload_mut().load() {
            if !minimal {
                status_error(format!("Failed to load input: {err}"));
            }

            return 3;
        }

        if carrier.payload().has_stego_payload() {
            if !minimal {
                status_alert("Stego data present!");
            }

            report.push(Detection::Stego);
        } else if !minimal {
            status_normal("No stego data present.");
        }
    }

    if !minimal {
        status_normal(format!(
            "Finished detecting payloads. Found {} payload(s).",
            report.len()
        ));
    } else if !report.is_empty() {
        let joined = report
            .iter()
            .map(Detection::to_string)
            .collect::<Vec<_>>()
            .join(",");

        println!("{joined}");
    }

    0
}
