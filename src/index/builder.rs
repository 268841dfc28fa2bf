//! Streaming index construction.
//!
//! Records are consumed in file order and buffered per chromosome: when the
//! resolved chromosome changes, the pending buffer is flushed to the sink
//! as one batch, so peak memory is bounded by one chromosome's records (or
//! the configured buffer size, whichever triggers first) instead of the
//! whole file.
//!
//! Records whose contig resolves to no known chromosome, directly or via
//! the "chr"-prefix fallback, are skipped without failing the build.

use crate::readers::{SourcePayload, SourceRecord};
use crate::reference::ChromosomeMap;
use crate::types::{
    gene_feature_type, Chromosome, FeatureFile, FeatureKind, FeatureRecord, FeatureType,
    GeneContentMode, GeneStreamKind,
};
use crate::{Error, Result};
use uuid::Uuid;

use super::store::FeatureSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Records converted into index documents
    pub indexed: u64,
    /// Records dropped because their contig resolved to no chromosome
    pub skipped_unresolved: u64,
    /// Records dropped by type-eligibility rules (e.g. CDS lines)
    pub skipped_ineligible: u64,
    /// Batches flushed to the sink
    pub batches: u64,
}

/// Which records of a stream are eligible, and how they are tagged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamProfile {
    Variants,
    /// gene + transcript + exon records
    GeneFull,
    /// gene + exon records only (coarse stream of incremental builds)
    GeneCoarse,
    /// transcript-stream records of a dual-reader build
    GeneTranscript,
    Intervals,
}

impl StreamProfile {
    fn gene_eligible(&self, feature_type: FeatureType) -> bool {
        match self {
            StreamProfile::GeneCoarse => {
                matches!(feature_type, FeatureType::Gene | FeatureType::Exon)
            }
            _ => matches!(
                feature_type,
                FeatureType::Gene | FeatureType::Mrna | FeatureType::Exon
            ),
        }
    }

    fn stream_tag(&self) -> Option<GeneStreamKind> {
        match self {
            StreamProfile::GeneCoarse => Some(GeneStreamKind::LargeScale),
            StreamProfile::GeneTranscript => Some(GeneStreamKind::Transcript),
            _ => None,
        }
    }
}

/// Streams source records into per-chromosome batches on a sink
struct IndexBuilder<'a, S: FeatureSink> {
    file: &'a FeatureFile,
    chromosomes: &'a ChromosomeMap,
    sink: S,
    buffer: Vec<FeatureRecord>,
    buffer_limit: usize,
    current_chromosome: Option<i64>,
    stats: BuildStats,
}

impl<'a, S: FeatureSink> IndexBuilder<'a, S> {
    fn new(
        file: &'a FeatureFile,
        chromosomes: &'a ChromosomeMap,
        sink: S,
        buffer_limit: usize,
    ) -> Self {
        IndexBuilder {
            file,
            chromosomes,
            sink,
            buffer: Vec::new(),
            buffer_limit: buffer_limit.max(1),
            current_chromosome: None,
            stats: BuildStats::default(),
        }
    }

    fn index_stream(
        &mut self,
        records: impl Iterator<Item = Result<SourceRecord>>,
        profile: StreamProfile,
    ) -> Result<()> {
        for record in records {
            let record = record.map_err(|e| Error::build(self.file, e))?;
            self.push(record, profile)
                .map_err(|e| Error::build(self.file, e))?;
        }
        // last-chromosome flush; the chromosome batching rule applies
        // independently to each stream
        self.flush().map_err(|e| Error::build(self.file, e))?;
        self.current_chromosome = None;
        Ok(())
    }

    fn push(&mut self, record: SourceRecord, profile: StreamProfile) -> Result<()> {
        let Some(chromosome) = self.chromosomes.resolve(&record.contig).cloned() else {
            self.stats.skipped_unresolved += 1;
            return Ok(());
        };

        if self.current_chromosome != Some(chromosome.id) {
            self.flush()?;
            self.current_chromosome = Some(chromosome.id);
        }

        let Some(converted) = self.convert(&chromosome, record, profile) else {
            self.stats.skipped_ineligible += 1;
            return Ok(());
        };

        self.buffer.push(converted);
        self.stats.indexed += 1;
        if self.buffer.len() >= self.buffer_limit {
            self.flush()?;
        }
        Ok(())
    }

    fn convert(
        &self,
        chromosome: &Chromosome,
        record: SourceRecord,
        profile: StreamProfile,
    ) -> Option<FeatureRecord> {
        let (feature_type, kind) = match record.payload {
            SourcePayload::Variant(payload) => {
                (FeatureType::Variation, FeatureKind::Variant(payload))
            }
            SourcePayload::Gene { raw_type, mut payload } => {
                let feature_type = gene_feature_type(&raw_type)?;
                if !profile.gene_eligible(feature_type) {
                    return None;
                }
                payload.stream = profile.stream_tag();
                (feature_type, FeatureKind::Gene(payload))
            }
            SourcePayload::Interval => (FeatureType::BedFeature, FeatureKind::Interval),
        };

        Some(FeatureRecord {
            uid: Uuid::new_v4(),
            file_id: self.file.id,
            chromosome_id: chromosome.id,
            chromosome_name: chromosome.name.clone(),
            start_index: record.start,
            end_index: record.end,
            feature_id: record.feature_id,
            feature_name: record.feature_name,
            feature_type,
            kind,
        })
    }

    /// Moves the pending batch out and writes it; the buffer being flushed
    /// is never the buffer being appended to.
    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let chromosome = batch[0].chromosome_name.clone();
        let size = batch.len();
        self.sink.write_batch(batch)?;
        self.stats.batches += 1;
        tracing::info!(
            file = self.file.id,
            chromosome = %chromosome,
            records = size,
            "wrote feature index batch"
        );
        Ok(())
    }

    /// Closes the sink, committing all flushed batches durably
    fn finish(self) -> Result<BuildStats> {
        self.sink.close().map_err(|e| Error::build(self.file, e))?;
        Ok(self.stats)
    }
}

/// Indexes a VCF record stream
pub fn build_variant_index<S: FeatureSink>(
    file: &FeatureFile,
    chromosomes: &ChromosomeMap,
    sink: S,
    buffer_limit: usize,
    records: impl Iterator<Item = Result<SourceRecord>>,
) -> Result<BuildStats> {
    let mut builder = IndexBuilder::new(file, chromosomes, sink, buffer_limit);
    builder.index_stream(records, StreamProfile::Variants)?;
    builder.finish()
}

/// Indexes a gene (GFF/GTF) record stream. `Full` indexes gene, transcript
/// and exon records; `Incremental` indexes the coarse gene/exon subset.
pub fn build_gene_index<S: FeatureSink>(
    file: &FeatureFile,
    chromosomes: &ChromosomeMap,
    sink: S,
    buffer_limit: usize,
    mode: GeneContentMode,
    records: impl Iterator<Item = Result<SourceRecord>>,
) -> Result<BuildStats> {
    let profile = match mode {
        GeneContentMode::Full => StreamProfile::GeneFull,
        GeneContentMode::Incremental => StreamProfile::GeneCoarse,
    };
    let mut builder = IndexBuilder::new(file, chromosomes, sink, buffer_limit);
    builder.index_stream(records, profile)?;
    builder.finish()
}

/// Dual-reader gene build: a coarse large-scale stream merged with a fine
/// transcript stream, each record tagged with its originating stream.
pub fn build_gene_index_dual<S: FeatureSink>(
    file: &FeatureFile,
    chromosomes: &ChromosomeMap,
    sink: S,
    buffer_limit: usize,
    large_scale: impl Iterator<Item = Result<SourceRecord>>,
    transcript: impl Iterator<Item = Result<SourceRecord>>,
) -> Result<BuildStats> {
    let mut builder = IndexBuilder::new(file, chromosomes, sink, buffer_limit);
    builder.index_stream(large_scale, StreamProfile::GeneCoarse)?;
    builder.index_stream(transcript, StreamProfile::GeneTranscript)?;
    builder.finish()
}

/// Indexes a BED record stream
pub fn build_interval_index<S: FeatureSink>(
    file: &FeatureFile,
    chromosomes: &ChromosomeMap,
    sink: S,
    buffer_limit: usize,
    records: impl Iterator<Item = Result<SourceRecord>>,
) -> Result<BuildStats> {
    let mut builder = IndexBuilder::new(file, chromosomes, sink, buffer_limit);
    builder.index_stream(records, StreamProfile::Intervals)?;
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileFormat, GenePayload, VariantPayload};
    use std::path::PathBuf;

    /// Sink that records batch boundaries instead of writing an index
    #[derive(Default)]
    struct RecordingSink {
        batches: std::rc::Rc<std::cell::RefCell<Vec<Vec<FeatureRecord>>>>,
        closed: std::rc::Rc<std::cell::RefCell<bool>>,
    }

    impl FeatureSink for RecordingSink {
        fn write_batch(&mut self, batch: Vec<FeatureRecord>) -> Result<()> {
            self.batches.borrow_mut().push(batch);
            Ok(())
        }

        fn close(self) -> Result<()> {
            *self.closed.borrow_mut() = true;
            Ok(())
        }
    }

    fn chromosomes() -> ChromosomeMap {
        ChromosomeMap::new([
            Chromosome {
                id: 1,
                name: "chr1".to_string(),
                size: 10_000,
                reference_id: 1,
            },
            Chromosome {
                id: 2,
                name: "chr2".to_string(),
                size: 10_000,
                reference_id: 1,
            },
        ])
    }

    fn vcf_file() -> FeatureFile {
        FeatureFile {
            id: 5,
            name: "sample.vcf".to_string(),
            format: FileFormat::Vcf,
            path: PathBuf::from("sample.vcf"),
            reference_id: 1,
        }
    }

    fn variant(contig: &str, start: u64) -> Result<SourceRecord> {
        Ok(SourceRecord {
            contig: contig.to_string(),
            start,
            end: start,
            feature_id: None,
            feature_name: None,
            payload: SourcePayload::Variant(VariantPayload::default()),
        })
    }

    fn gene(contig: &str, start: u64, raw_type: &str) -> Result<SourceRecord> {
        Ok(SourceRecord {
            contig: contig.to_string(),
            start,
            end: start + 10,
            feature_id: Some(format!("{raw_type}_{start}")),
            feature_name: Some(format!("{raw_type}_{start}")),
            payload: SourcePayload::Gene {
                raw_type: raw_type.to_string(),
                payload: GenePayload::default(),
            },
        })
    }

    #[test]
    fn test_batches_are_single_chromosome_in_first_occurrence_order() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let file = vcf_file();
        let map = chromosomes();

        let records = vec![
            variant("1", 10),
            variant("1", 20),
            variant("chr2", 5),
            variant("chr2", 6),
        ];
        let stats =
            build_variant_index(&file, &map, sink, 1000, records.into_iter()).unwrap();

        assert_eq!(stats.indexed, 4);
        assert_eq!(stats.batches, 2);
        let batches = batches.borrow();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].iter().all(|r| r.chromosome_name == "chr1"));
        assert!(batches[1].iter().all(|r| r.chromosome_name == "chr2"));
        // encounter order survives within a batch
        assert_eq!(batches[0][0].start_index, 10);
        assert_eq!(batches[0][1].start_index, 20);
    }

    #[test]
    fn test_unresolvable_contigs_skipped_without_failing() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let file = vcf_file();
        let map = chromosomes();

        let records = vec![variant("1", 10), variant("MT", 5), variant("GL000", 7)];
        let stats =
            build_variant_index(&file, &map, sink, 1000, records.into_iter()).unwrap();

        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.skipped_unresolved, 2);
        assert_eq!(batches.borrow().len(), 1);
        assert_eq!(batches.borrow()[0].len(), 1);
    }

    #[test]
    fn test_trailing_unresolvable_records_lose_nothing() {
        // resolvable batch pending, then only junk contigs to end of file
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let file = vcf_file();
        let map = chromosomes();

        let records = vec![
            variant("chr1", 1),
            variant("chr1", 2),
            variant("weird_contig", 3),
            variant("weird_contig", 4),
        ];
        let stats =
            build_variant_index(&file, &map, sink, 1000, records.into_iter()).unwrap();

        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.skipped_unresolved, 2);
        let batches = batches.borrow();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn test_buffer_limit_triggers_intra_chromosome_flush() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let file = vcf_file();
        let map = chromosomes();

        let records: Vec<_> = (0..5).map(|i| variant("chr1", i + 1)).collect();
        let stats = build_variant_index(&file, &map, sink, 2, records.into_iter()).unwrap();

        assert_eq!(stats.indexed, 5);
        assert_eq!(stats.batches, 3);
        // still single-chromosome batches
        for batch in batches.borrow().iter() {
            assert!(batch.iter().all(|r| r.chromosome_name == "chr1"));
        }
    }

    #[test]
    fn test_empty_stream_is_not_an_error() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let closed = sink.closed.clone();
        let file = vcf_file();
        let map = chromosomes();

        let stats =
            build_variant_index(&file, &map, sink, 1000, std::iter::empty()).unwrap();
        assert_eq!(stats, BuildStats::default());
        assert!(batches.borrow().is_empty());
        assert!(*closed.borrow());
    }

    #[test]
    fn test_read_error_aborts_with_file_identity() {
        let sink = RecordingSink::default();
        let file = vcf_file();
        let map = chromosomes();

        let records = vec![
            variant("chr1", 1),
            Err(Error::MalformedRecord("truncated line".to_string())),
        ];
        let err =
            build_variant_index(&file, &map, sink, 1000, records.into_iter()).unwrap_err();
        match err {
            Error::Build { file, .. } => assert!(file.contains("sample.vcf")),
            other => panic!("expected build error, got {other}"),
        }
    }

    #[test]
    fn test_gene_mode_eligibility() {
        let file = FeatureFile {
            format: FileFormat::Gff,
            ..vcf_file()
        };
        let map = chromosomes();

        let records = || {
            vec![
                gene("chr1", 100, "gene"),
                gene("chr1", 100, "mRNA"),
                gene("chr1", 100, "exon"),
                gene("chr1", 100, "CDS"),
            ]
        };

        let sink = RecordingSink::default();
        let stats = build_gene_index(
            &file,
            &map,
            sink,
            1000,
            GeneContentMode::Full,
            records().into_iter(),
        )
        .unwrap();
        assert_eq!(stats.indexed, 3);
        assert_eq!(stats.skipped_ineligible, 1);

        let sink = RecordingSink::default();
        let stats = build_gene_index(
            &file,
            &map,
            sink,
            1000,
            GeneContentMode::Incremental,
            records().into_iter(),
        )
        .unwrap();
        // mRNA and CDS both dropped by the coarse profile
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.skipped_ineligible, 2);
    }

    #[test]
    fn test_dual_stream_tags_records() {
        let file = FeatureFile {
            format: FileFormat::Gff,
            ..vcf_file()
        };
        let map = chromosomes();
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();

        let large_scale = vec![gene("chr1", 100, "gene")];
        let transcript = vec![gene("chr1", 100, "mRNA"), gene("chr2", 50, "exon")];
        let stats = build_gene_index_dual(
            &file,
            &map,
            sink,
            1000,
            large_scale.into_iter(),
            transcript.into_iter(),
        )
        .unwrap();

        assert_eq!(stats.indexed, 3);
        // one flush per stream-end plus the chr1->chr2 change
        assert_eq!(stats.batches, 3);

        let batches = batches.borrow();
        let tag = |r: &FeatureRecord| match &r.kind {
            FeatureKind::Gene(g) => g.stream,
            _ => None,
        };
        assert_eq!(tag(&batches[0][0]), Some(GeneStreamKind::LargeScale));
        assert_eq!(tag(&batches[1][0]), Some(GeneStreamKind::Transcript));
        assert_eq!(tag(&batches[2][0]), Some(GeneStreamKind::Transcript));
    }
}
