//! Log de Amostras Rotuladas (JSON lines)
//!
//! A escrita roda numa thread dedicada, fora do hot path: o pipeline só
//! empurra [`Sample`] num channel. O arquivo é aberto em modo append e
//! nunca é truncado; cada linha é um registro independente.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::error::SampleLogError;
use crate::features::FEATURE_NAMES;
use crate::types::Sample;

/// Flush forçado a cada N amostras durante rajadas.
const FLUSH_EVERY: u64 = 1000;

/// Destino das amostras rotuladas.
pub trait SampleSink {
    fn append(&mut self, sample: Sample) -> Result<(), SampleLogError>;
}

/// Sink em memória (testes e replays).
impl SampleSink for Vec<Sample> {
    fn append(&mut self, sample: Sample) -> Result<(), SampleLogError> {
        self.push(sample);
        Ok(())
    }
}

/// Serializa amostras como JSON lines em qualquer `Write`.
pub struct JsonlWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write(&mut self, sample: &Sample) -> Result<(), SampleLogError> {
        serde_json::to_writer(&mut self.out, sample)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SampleLogError> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Lado do pipeline: envia amostras para a thread de escrita.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Sample>,
}

impl SampleSink for ChannelSink {
    fn append(&mut self, sample: Sample) -> Result<(), SampleLogError> {
        self.tx.send(sample).map_err(|_| SampleLogError::WriterClosed)
    }
}

/// Handle da thread de escrita.
pub struct SampleWriter {
    tx: mpsc::Sender<Sample>,
    handle: JoinHandle<Result<u64, SampleLogError>>,
}

impl SampleWriter {
    /// Abre (ou cria) o arquivo em modo append e inicia a thread de escrita.
    pub fn spawn(path: &Path) -> Result<Self, SampleLogError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (tx, rx) = mpsc::channel();
        let path = path.to_path_buf();
        let handle = std::thread::Builder::new()
            .name("sample-writer".into())
            .spawn(move || sample_writer_thread(file, path, rx))?;
        Ok(Self { tx, handle })
    }

    pub fn sink(&self) -> ChannelSink {
        ChannelSink { tx: self.tx.clone() }
    }

    /// Fecha o channel, espera a thread drenar e retorna o total escrito.
    ///
    /// Todos os [`ChannelSink`] devem ter sido descartados antes.
    pub fn finish(self) -> Result<u64, SampleLogError> {
        drop(self.tx);
        self.handle
            .join()
            .map_err(|_| SampleLogError::WriterClosed)?
    }
}

/// Loop da thread de escrita: recebe amostras do channel e grava no arquivo.
///
/// Depois de cada rajada (channel vazio) faz flush, então em regime normal
/// cada amostra chega ao disco logo após ser produzida.
fn sample_writer_thread(
    file: File,
    path: PathBuf,
    rx: mpsc::Receiver<Sample>,
) -> Result<u64, SampleLogError> {
    let mut writer = JsonlWriter::new(BufWriter::with_capacity(64 * 1024, file));
    let mut count = 0u64;

    while let Ok(sample) = rx.recv() {
        writer.write(&sample)?;
        count += 1;

        while let Ok(sample) = rx.try_recv() {
            writer.write(&sample)?;
            count += 1;
            if count % FLUSH_EVERY == 0 {
                writer.flush()?;
            }
        }
        writer.flush()?;
        debug!(count, "amostras gravadas");
    }

    writer.flush()?;
    info!(count, path = %path.display(), "writer de amostras finalizado");
    Ok(count)
}

/// Conteúdo lido de um log de amostras.
#[derive(Debug, Default)]
pub struct SampleLog {
    pub samples: Vec<Sample>,
    /// Linhas inválidas ignoradas.
    pub skipped: usize,
}

/// Lê um log JSONL. Linhas inválidas são ignoradas (com aviso), linhas
/// vazias são puladas em silêncio.
pub fn read_samples(path: &Path) -> Result<SampleLog, SampleLogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut log = SampleLog::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Sample>(&line) {
            Ok(sample) => log.samples.push(sample),
            Err(e) => {
                warn!(line = index + 1, error = %e, "linha inválida ignorada");
                log.skipped += 1;
            }
        }
    }

    Ok(log)
}

/// Exporta amostras como CSV de treino, colunas na ordem do schema.
///
/// `class` é o índice de classe do modelo (`{-1→0, 0→1, 1→2}`).
pub fn export_training_csv<W: Write>(samples: &[Sample], out: W) -> Result<(), SampleLogError> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec!["timestamp"];
    header.extend(FEATURE_NAMES);
    header.extend(["predicted_signal", "label", "class"]);
    writer.write_record(&header)?;

    for sample in samples {
        let mut row = Vec::with_capacity(header.len());
        row.push(sample.timestamp_ms.to_string());
        // Display de f64 é a menor representação que volta ao mesmo valor.
        row.extend(sample.features.values().iter().map(|v| v.to_string()));
        row.push(sample.predicted_signal.as_i8().to_string());
        row.push(sample.label.as_i8().to_string());
        row.push(sample.label.class_index().to_string());
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureVector, NUM_FEATURES};
    use crate::types::Signal;

    fn sample(ts: i64, label: Signal) -> Sample {
        let mut values = [0.0; NUM_FEATURES];
        values[0] = 68000.123456789;
        values[10] = 1.0 / 3.0;
        Sample {
            timestamp_ms: ts,
            features: FeatureVector::from_values(values),
            predicted_signal: Signal::Hold,
            label,
        }
    }

    #[test]
    fn jsonl_line_format() {
        let mut writer = JsonlWriter::new(Vec::new());
        writer.write(&sample(42, Signal::Buy)).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();

        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["timestamp"], 42);
        assert_eq!(value["predicted_signal"], 0);
        assert_eq!(value["label"], 1);
        assert_eq!(value["features"]["mean_price"], 68000.123456789);
        assert_eq!(value["features"].as_object().unwrap().len(), NUM_FEATURES);
    }

    #[test]
    fn csv_export_columns() {
        let mut out = Vec::new();
        export_training_csv(&[sample(7, Signal::Sell)], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(header.len(), NUM_FEATURES + 4);
        assert_eq!(header[1], "mean_price");
        assert_eq!(header[NUM_FEATURES], "volume_per_second");
        assert_eq!(&header[NUM_FEATURES + 1..], &["predicted_signal", "label", "class"]);

        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row[0], "7");
        assert_eq!(row[11].parse::<f64>().unwrap(), 1.0 / 3.0);
        assert_eq!(&row[NUM_FEATURES + 1..], &["0", "-1", "0"]);
    }
}
