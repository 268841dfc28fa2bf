//! End-to-end tests: real files on disk, real indexes, real searches.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use featix::bookmarks::{Bookmark, BookmarkSearcher, InMemoryBookmarks};
use featix::index::{
    build_gene_index, build_variant_index, delete_file_documents, FilterSpec, IndexCollection,
    IndexWriterHandle, SearchEngine, SortRequest,
};
use featix::readers;
use featix::reference::Reference;
use featix::store::{FileStore, LocalFileStore};
use featix::types::{
    Chromosome, FeatureFile, FeatureType, FileFormat, FileId, GeneContentMode, VariationType,
};
use tempfile::TempDir;

const VCF_HEADER: &str = "##fileformat=VCFv4.2\n\
    ##contig=<ID=chr1,length=1000000>\n\
    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

fn chromosome(id: i64, name: &str) -> Chromosome {
    Chromosome {
        id,
        name: name.to_string(),
        size: 1_000_000,
        reference_id: 1,
    }
}

fn reference(gene_file: Option<FeatureFile>) -> Reference {
    Reference {
        id: 1,
        name: "grch38".to_string(),
        chromosomes: vec![chromosome(1, "chr1"), chromosome(2, "chr2")],
        gene_file,
        annotation_files: Vec::new(),
    }
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn feature_file(id: FileId, format: FileFormat, path: PathBuf) -> FeatureFile {
    FeatureFile {
        id,
        name: path.file_name().unwrap().to_string_lossy().into_owned(),
        format,
        path,
        reference_id: 1,
    }
}

fn build_index(file: &FeatureFile, reference: &Reference, store: &LocalFileStore) {
    let sink = IndexWriterHandle::create_or_open(&store.index_dir(file)).unwrap();
    let records = readers::open_reader(file).unwrap();
    let chromosomes = reference.chromosome_map();
    match file.format {
        FileFormat::Vcf => {
            build_variant_index(file, &chromosomes, sink, 10_000, records).unwrap();
        }
        FileFormat::Gff | FileFormat::Gtf => {
            build_gene_index(file, &chromosomes, sink, 10_000, GeneContentMode::Full, records)
                .unwrap();
        }
        FileFormat::Bed => unimplemented!("no bed fixtures in this suite"),
    }
}

/// Two VCF files with interleaved positions, indexed separately
fn two_vcf_setup(tmp: &TempDir) -> (LocalFileStore, Reference, Vec<FeatureFile>) {
    let store = LocalFileStore::new(tmp.path().join("data"));
    let reference = reference(None);

    let vcf_a = format!(
        "{VCF_HEADER}\
        chr1\t100\trs1\tA\tG\t50\tPASS\tDP=10\n\
        chr1\t300\trs3\tAT\tA\t30\tPASS\tDP=5\n\
        chr2\t50\trs5\tC\tT\t.\tq10\tDP=2\n"
    );
    let vcf_b = format!(
        "{VCF_HEADER}\
        1\t200\trs2\tC\tCTT\t40\tPASS\tDP=8\n\
        chr1\t400\trs4\tG\tA\t20\tPASS\tDP=7\n"
    );

    let file_a = feature_file(1, FileFormat::Vcf, write_file(tmp.path(), "a.vcf", &vcf_a));
    let file_b = feature_file(2, FileFormat::Vcf, write_file(tmp.path(), "b.vcf", &vcf_b));
    build_index(&file_a, &reference, &store);
    build_index(&file_b, &reference, &store);

    (store, reference, vec![file_a, file_b])
}

#[test]
fn test_multi_file_search_merges_in_position_order() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 100);

    let result = engine
        .search(&files, &FilterSpec::default(), FeatureType::Variation)
        .unwrap();

    assert_eq!(result.total_results_count, 5);
    assert!(!result.exceeds_limit);
    assert!(result.total_pages_count.is_none());

    let ids: Vec<&str> = result
        .entries
        .iter()
        .map(|e| e.feature_id.as_deref().unwrap())
        .collect();
    // global (chromosome, start) order regardless of source file
    assert_eq!(ids, vec!["rs1", "rs2", "rs3", "rs4", "rs5"]);
}

#[test]
fn test_pagination_is_a_window_over_the_same_order() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 100);

    let unpaged = engine
        .search(&files, &FilterSpec::default(), FeatureType::Variation)
        .unwrap();

    let mut paged_ids = Vec::new();
    for page in 1..=3 {
        let spec = FilterSpec {
            page: Some(page),
            page_size: Some(2),
            ..FilterSpec::default()
        };
        let result = engine.search(&files, &spec, FeatureType::Variation).unwrap();
        assert_eq!(result.total_results_count, 5);
        assert_eq!(result.total_pages_count, Some(3));
        assert!(!result.exceeds_limit);
        paged_ids.extend(result.entries.iter().map(|e| e.uid));
    }

    let unpaged_ids: Vec<_> = unpaged.entries.iter().map(|e| e.uid).collect();
    assert_eq!(paged_ids, unpaged_ids);
}

#[test]
fn test_total_pages_matches_count_and_page_size() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 100);

    // 5 matches, pages of 2 -> 3 pages
    let spec = FilterSpec {
        page_size: Some(2),
        ..FilterSpec::default()
    };
    assert_eq!(
        engine.total_pages(&files, &spec, FeatureType::Variation).unwrap(),
        3
    );

    // predicate narrows the count: one deletion -> one page
    let spec = FilterSpec {
        variation_types: Some(vec![VariationType::Del]),
        page_size: Some(2),
        ..FilterSpec::default()
    };
    assert_eq!(
        engine.total_pages(&files, &spec, FeatureType::Variation).unwrap(),
        1
    );
}

#[test]
fn test_distinct_values_enumerates_indexed_terms() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 100);

    let values = engine.distinct_values(&files, "variation_type").unwrap();
    assert_eq!(values, vec!["del", "ins", "snv"]);

    let values = engine.distinct_values(&files, "chromosome_name").unwrap();
    assert_eq!(values, vec!["chr1", "chr2"]);
}

#[test]
fn test_unpaginated_search_truncates_and_flags() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 3);

    let result = engine
        .search(&files, &FilterSpec::default(), FeatureType::Variation)
        .unwrap();
    assert_eq!(result.entries.len(), 3);
    assert_eq!(result.total_results_count, 5);
    assert!(result.exceeds_limit);
}

#[test]
fn test_search_against_unbuilt_index_fails() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, mut files) = two_vcf_setup(&tmp);
    files.push(feature_file(99, FileFormat::Vcf, tmp.path().join("missing.vcf")));

    let engine = SearchEngine::new(Arc::new(store), 100);
    let err = engine
        .search(&files, &FilterSpec::default(), FeatureType::Variation)
        .unwrap_err();
    assert!(matches!(err, featix::Error::IndexNotFound(_)));
}

#[test]
fn test_variation_type_filter() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 100);

    let spec = FilterSpec {
        variation_types: Some(vec![VariationType::Del]),
        ..FilterSpec::default()
    };
    let result = engine.search(&files, &spec, FeatureType::Variation).unwrap();
    assert_eq!(result.total_results_count, 1);
    assert_eq!(result.entries[0].feature_id.as_deref(), Some("rs3"));
}

#[test]
fn test_quality_sort_descending() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 100);

    let spec = FilterSpec {
        sort: Some(SortRequest {
            field: "quality".to_string(),
            descending: true,
        }),
        ..FilterSpec::default()
    };
    let result = engine.search(&files, &spec, FeatureType::Variation).unwrap();
    let ids: Vec<&str> = result
        .entries
        .iter()
        .map(|e| e.feature_id.as_deref().unwrap())
        .collect();
    // qualities: rs1=50, rs2=40, rs3=30, rs4=20, rs5=missing (indexed as 0)
    assert_eq!(ids, vec!["rs1", "rs2", "rs3", "rs4", "rs5"]);
}

#[test]
fn test_group_by_variation_type() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 100);

    let counts = engine
        .group(
            &files,
            &FilterSpec::default(),
            FeatureType::Variation,
            "variation_type",
        )
        .unwrap();

    // 3 SNVs (rs1, rs4, rs5), 1 deletion (rs3), 1 insertion (rs2)
    assert_eq!(counts[0], ("snv".to_string(), 3));
    assert!(counts.contains(&("del".to_string(), 1)));
    assert!(counts.contains(&("ins".to_string(), 1)));
}

#[test]
fn test_chromosomes_with_matches_uses_no_scan_results() {
    let tmp = TempDir::new().unwrap();
    let (store, _reference, files) = two_vcf_setup(&tmp);
    let engine = SearchEngine::new(Arc::new(store), 100);

    let ids = engine
        .chromosomes_with_matches(&files, &FilterSpec::default(), FeatureType::Variation)
        .unwrap();
    assert_eq!(ids, vec![1, 2]);

    // filtered down to chr2 only
    let spec = FilterSpec {
        start_from: Some(1),
        end_to: Some(60),
        ..FilterSpec::default()
    };
    let ids = engine
        .chromosomes_with_matches(&files, &spec, FeatureType::Variation)
        .unwrap();
    assert_eq!(ids, vec![2]);
}

#[test]
fn test_unknown_contigs_are_skipped_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let store = LocalFileStore::new(tmp.path().join("data"));
    let reference = reference(None);

    // "1" resolves to chr1 via the prefix fallback; "MT" resolves nowhere
    let vcf = format!(
        "{VCF_HEADER}\
        1\t100\trs1\tA\tG\t50\tPASS\tDP=10\n\
        MT\t10\trs9\tC\tT\t20\tPASS\tDP=4\n"
    );
    let file = feature_file(7, FileFormat::Vcf, write_file(tmp.path(), "mt.vcf", &vcf));
    build_index(&file, &reference, &store);

    let engine = SearchEngine::new(Arc::new(store), 100);
    let result = engine
        .search(
            &[file],
            &FilterSpec::default(),
            FeatureType::Variation,
        )
        .unwrap();
    assert_eq!(result.total_results_count, 1);
    assert_eq!(result.entries[0].chromosome_name, "chr1");
}

const GFF: &str = "\
##gff-version 3
chr1\thavana\tgene\t1000\t5000\t.\t+\t.\tID=ENSG01;Name=BRCA1
chr1\thavana\tmRNA\t1000\t4800\t.\t+\t.\tID=ENST01;Name=BRCA1-201;Parent=ENSG01
chr1\thavana\texon\t1000\t1200\t.\t+\t.\tID=exon01;Parent=ENST01
chr2\thavana\tgene\t2000\t9000\t.\t-\t.\tID=ENSG02;Name=TP53
";

#[test]
fn test_feature_lookup_puts_bookmarks_first() {
    let tmp = TempDir::new().unwrap();
    let store = LocalFileStore::new(tmp.path().join("data"));

    let path = write_file(tmp.path(), "genes.gff", GFF);
    let gene_file = feature_file(3, FileFormat::Gff, path);
    let reference = reference(Some(gene_file.clone()));
    build_index(&gene_file, &reference, &store);

    let mut bookmarks = InMemoryBookmarks::new();
    bookmarks.add(Bookmark {
        id: 1,
        name: "BRCA1 region of interest".to_string(),
        chromosome: chromosome(1, "chr1"),
        start_index: 900,
        end_index: 5100,
    });

    let engine = SearchEngine::new(Arc::new(store), 100);
    let result = engine
        .search_features_by_reference("BRCA", &reference, &bookmarks)
        .unwrap();

    // bookmark hit, then the gene and its transcript; exons never match
    assert_eq!(result.total_results_count, 3);
    assert_eq!(result.entries[0].feature_type, FeatureType::Bookmark);
    let index_hits: Vec<FeatureType> =
        result.entries[1..].iter().map(|e| e.feature_type).collect();
    assert!(index_hits.contains(&FeatureType::Gene));
    assert!(index_hits.contains(&FeatureType::Mrna));
}

#[test]
fn test_feature_lookup_without_gene_files_is_bookmarks_only() {
    let tmp = TempDir::new().unwrap();
    let store = LocalFileStore::new(tmp.path().join("data"));
    let reference = reference(None);

    let mut bookmarks = InMemoryBookmarks::new();
    bookmarks.add(Bookmark {
        id: 1,
        name: "TP53 hotspot".to_string(),
        chromosome: chromosome(2, "chr2"),
        start_index: 1,
        end_index: 100,
    });

    let engine = SearchEngine::new(Arc::new(store), 100);
    let result = engine
        .search_features_by_reference("tp53", &reference, &bookmarks)
        .unwrap();
    assert_eq!(result.total_results_count, 1);
    assert_eq!(result.entries[0].feature_type, FeatureType::Bookmark);
}

#[test]
fn test_interval_search_matches_overlaps_only() {
    let tmp = TempDir::new().unwrap();
    let store = LocalFileStore::new(tmp.path().join("data"));

    let path = write_file(tmp.path(), "genes.gff", GFF);
    let gene_file = feature_file(3, FileFormat::Gff, path);
    let reference = reference(Some(gene_file.clone()));
    build_index(&gene_file, &reference, &store);

    let engine = SearchEngine::new(Arc::new(store), 100);

    // overlaps the gene body but not the first exon
    let result = engine
        .search_interval(std::slice::from_ref(&gene_file), 1, 4900, 6000, &[])
        .unwrap();
    let ids: Vec<&str> = result
        .entries
        .iter()
        .map(|e| e.feature_id.as_deref().unwrap())
        .collect();
    assert_eq!(ids, vec!["ENSG01"]);

    // interval strictly inside the gene still matches it (spanning case)
    let result = engine
        .search_interval(std::slice::from_ref(&gene_file), 1, 1500, 1600, &[])
        .unwrap();
    let mut ids: Vec<&str> = result
        .entries
        .iter()
        .map(|e| e.feature_id.as_deref().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["ENSG01", "ENST01"]);

    // wrong chromosome
    let result = engine
        .search_interval(std::slice::from_ref(&gene_file), 2, 1, 1999, &[])
        .unwrap();
    assert_eq!(result.total_results_count, 0);
}

#[test]
fn test_delete_by_file_id_leaves_other_files_intact() {
    let tmp = TempDir::new().unwrap();
    let store = LocalFileStore::new(tmp.path().join("data"));
    let reference = reference(None);

    // both files written into one shared index directory
    let shared = tmp.path().join("data").join("shared").join("index");
    let vcf_a = format!("{VCF_HEADER}chr1\t100\trs1\tA\tG\t50\tPASS\tDP=10\n");
    let vcf_b = format!("{VCF_HEADER}chr1\t200\trs2\tC\tT\t40\tPASS\tDP=8\n");
    let file_a = feature_file(1, FileFormat::Vcf, write_file(tmp.path(), "a.vcf", &vcf_a));
    let file_b = feature_file(2, FileFormat::Vcf, write_file(tmp.path(), "b.vcf", &vcf_b));
    let chromosomes = reference.chromosome_map();
    for file in [&file_a, &file_b] {
        let sink = IndexWriterHandle::create_or_open(&shared).unwrap();
        let records = readers::open_reader(file).unwrap();
        build_variant_index(file, &chromosomes, sink, 10_000, records).unwrap();
    }

    let collection = IndexCollection::open(std::slice::from_ref(&shared)).unwrap();
    assert_eq!(
        collection.count(&tantivy::query::AllQuery).unwrap(),
        2
    );

    delete_file_documents(&shared, file_a.id).unwrap();

    let collection = IndexCollection::open(std::slice::from_ref(&shared)).unwrap();
    assert_eq!(collection.count(&tantivy::query::AllQuery).unwrap(), 1);
}

#[test]
fn test_bookmark_searcher_respects_engine_limit() {
    // trait-level check: limit is passed through by the engine
    let mut bookmarks = InMemoryBookmarks::new();
    for i in 0..10 {
        bookmarks.add(Bookmark {
            id: i,
            name: format!("region {i}"),
            chromosome: chromosome(1, "chr1"),
            start_index: 1,
            end_index: 10,
        });
    }
    let result = bookmarks.search_bookmarks("region", 4).unwrap();
    assert_eq!(result.entries.len(), 4);
}
