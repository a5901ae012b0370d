use std::io::Cursor;

use kira_chemdata_manager::domain::Category;
use kira_chemdata_manager::parsers::{
    DelimitedConfig, JsonLinesConfig, ParseContext, ParserSpec, ReactionSmilesConfig,
    RecordResult, StructureDataConfig,
};

/// Alternates good and bad records until both are used up.
fn interleave(good: Vec<Vec<u8>>, bad: Vec<Vec<u8>>) -> Vec<u8> {
    let mut good = good.into_iter();
    let mut bad = bad.into_iter();
    let mut out = Vec::new();
    loop {
        let next_good = good.next();
        let next_bad = bad.next();
        if next_good.is_none() && next_bad.is_none() {
            return out;
        }
        for chunk in [next_good, next_bad].into_iter().flatten() {
            out.extend(chunk);
        }
    }
}

fn run(spec: &ParserSpec, category: Category, data: Vec<u8>) -> Vec<RecordResult> {
    let context = ParseContext::new(category, "input");
    spec.parse(Box::new(Cursor::new(data)), context).collect()
}

fn assert_counts(results: &[RecordResult], good: usize, bad: usize) {
    let ok = results.iter().filter(|result| result.is_ok()).count();
    let failed = results.iter().filter(|result| result.is_err()).count();
    assert_eq!((ok, failed), (good, bad));
    for record in results.iter().flatten() {
        assert!(!record.structure.is_empty());
        assert_eq!(record.metadata["source_file"], "input");
    }
}

const SIZES: [(usize, usize); 5] = [(0, 0), (1, 0), (0, 3), (5, 2), (12, 7)];

#[test]
fn delimited_yields_every_good_and_bad_row() {
    let spec = ParserSpec::Delimited(DelimitedConfig::comma().id(&["id"]).structure(&["smiles"]));
    for (n, m) in SIZES {
        let good = (0..n).map(|i| format!("C{i},CID{i}\n").into_bytes()).collect();
        let bad = (0..m).map(|i| format!(",BAD{i}\n").into_bytes()).collect();
        let mut data = b"smiles,id\n".to_vec();
        data.extend(interleave(good, bad));
        assert_counts(&run(&spec, Category::Compound, data), n, m);
    }
}

#[test]
fn whitespace_delimited_yields_every_good_and_bad_row() {
    let spec = ParserSpec::Delimited(
        DelimitedConfig::whitespace()
            .headerless(&["smiles", "id"])
            .id(&["id"])
            .structure(&["smiles"]),
    );
    for (n, m) in SIZES {
        let good = (0..n).map(|i| format!("C{i} ZINC{i}\n").into_bytes()).collect();
        let bad = (0..m)
            .map(|i| {
                let mut line = format!("C{i}").into_bytes();
                line.extend([0xff, b' ', b'Z', b'\n']);
                line
            })
            .collect();
        assert_counts(&run(&spec, Category::Compound, interleave(good, bad)), n, m);
    }
}

#[test]
fn structure_data_yields_every_good_and_bad_block() {
    let spec = ParserSpec::StructureData(StructureDataConfig::new(&["SMILES"]));
    for (n, m) in SIZES {
        let good = (0..n)
            .map(|i| {
                format!("mol{i}\n  header\n\n  0  0  0  0\nM  END\n> <SMILES>\nC{i}\n\n> <MW>\n12.0\n\n$$$$\n")
                    .into_bytes()
            })
            .collect();
        let bad = (0..m)
            .map(|i| format!("broken{i}\nM  END\n> <MW>\n1.0\n\n$$$$\n").into_bytes())
            .collect();
        let results = run(&spec, Category::Compound, interleave(good, bad));
        assert_counts(&results, n, m);
        if n > 0 {
            let first = results[0].as_ref().unwrap();
            assert_eq!(first.id, "mol0");
            assert_eq!(first.metadata["MW"], "12.0");
        }
    }
}

#[test]
fn reaction_lines_yield_every_good_and_bad_line() {
    let spec = ParserSpec::ReactionSmiles(ReactionSmilesConfig::new());
    for (n, m) in SIZES {
        let good = (0..n).map(|i| format!("C{i}>>CO\n").into_bytes()).collect();
        let bad = (0..m).map(|_| b"C\xfe>>C\n".to_vec()).collect();
        let results = run(&spec, Category::Reaction, interleave(good, bad));
        assert_counts(&results, n, m);
        for record in results.iter().flatten() {
            assert_eq!(record.roles.as_ref().unwrap().products, "CO");
        }
    }
}

#[test]
fn json_lines_yield_every_good_and_bad_line() {
    let spec = ParserSpec::JsonLines(JsonLinesConfig::new(&["/smiles"]).id_pointer("/id"));
    for (n, m) in SIZES {
        let good = (0..n)
            .map(|i| format!("{{\"id\": \"R{i}\", \"smiles\": \"C>>C\"}}\n").into_bytes())
            .collect();
        let bad = (0..m)
            .map(|i| {
                if i % 2 == 0 {
                    b"{truncated\n".to_vec()
                } else {
                    format!("{{\"id\": \"R{i}\"}}\n").into_bytes()
                }
            })
            .collect();
        assert_counts(&run(&spec, Category::Reaction, interleave(good, bad)), n, m);
    }
}

#[test]
fn partial_support_keeps_only_provenance() {
    let spec = ParserSpec::ReactionSmiles(ReactionSmilesConfig::new().trailing(&["yield"]));
    let context = ParseContext::new(Category::Reaction, "crd.txt").structure_only(true);
    let results: Vec<_> = spec
        .parse(Box::new(Cursor::new(b"CC>>CO 85\n".to_vec())), context)
        .collect();
    let record = results[0].as_ref().unwrap();
    assert_eq!(record.structure, "CC>>CO");
    assert_eq!(record.metadata.len(), 1);
    assert_eq!(record.metadata["source_file"], "crd.txt");
}

#[test]
fn cxsmiles_extension_moves_to_metadata() {
    let spec = ParserSpec::ReactionSmiles(ReactionSmilesConfig::new());
    let data = b"[CH3:1]Cl.[OH-]>>[CH3:1]O |f:1.2| 1\n".to_vec();
    let results = run(&spec, Category::Reaction, data);
    let record = results[0].as_ref().unwrap();
    assert_eq!(record.structure, "[CH3:1]Cl.[OH-]>>[CH3:1]O");
    assert_eq!(record.metadata["cxsmiles_extension"], "|f:1.2|");
    assert_eq!(record.metadata["field_1"], "1");
    assert_eq!(record.roles.as_ref().unwrap().agents, "");
}
