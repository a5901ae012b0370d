use crate::domain::Category;
use crate::error::KiraError;
use crate::parsers::{DelimitedConfig, ParserSpec};
use crate::plan::{ArchiveFormat, StepTemplate};
use crate::registry::SourceDescriptor;
use crate::version::{Constraint, VersionPattern};

const CHEMBL_FTP: &str = "https://ftp.ebi.ac.uk/pub/databases/chembl/ChEMBLdb/releases";
const ZINC_FILES: &str = "https://files.docking.org";

pub(crate) fn descriptors() -> Result<Vec<SourceDescriptor>, KiraError> {
    Ok(vec![chembl()?, miscellaneous(), zinc()?])
}

fn chembl() -> Result<SourceDescriptor, KiraError> {
    let chemreps = DelimitedConfig::tab()
        .id(&["chembl_id"])
        .structure(&["canonical_smiles"]);

    let release = VersionPattern::parameterized("v_release_{release_number}", "v_release_34")?
        .constrain("release_number", Constraint::integer_at_least(25))
        .citation("10.6019/CHEMBL.database.{release_number}")
        .describe("chemical representations of a ChEMBL release")
        .step(
            StepTemplate::direct(
                &format!(
                    "{CHEMBL_FTP}/chembl_{{release_number}}/chembl_{{release_number}}_chemreps.txt.gz"
                ),
                "chembl_{release_number}_chemreps.txt.gz",
                ParserSpec::Delimited(chemreps),
            )
            .archive(ArchiveFormat::Gzip),
        );

    Ok(SourceDescriptor::new(Category::Compound, "chembl", "ChEMBL", "10.6019/CHEMBL.database").pattern(release))
}

fn zinc() -> Result<SourceDescriptor, KiraError> {
    let smiles_id = || {
        ParserSpec::Delimited(
            DelimitedConfig::whitespace()
                .headerless(&["smiles", "id"])
                .id(&["id"])
                .structure(&["smiles"]),
        )
    };

    let building_blocks = VersionPattern::parameterized(
        "v_building_blocks_{building_block_subset_name}",
        "v_building_blocks_in-stock",
    )?
    .constrain("building_block_subset_name", Constraint::pattern("[A-Za-z0-9-]+")?)
    .describe("building block subset, e.g. in-stock, for-sale")
    .step(
        StepTemplate::direct(
            &format!("{ZINC_FILES}/bb/current/{{building_block_subset_name}}.smi.gz"),
            "{building_block_subset_name}.smi.gz",
            smiles_id(),
        )
        .archive(ArchiveFormat::Gzip),
    );

    let catalog = VersionPattern::parameterized("v_catalog_{catalog_name}", "v_catalog_sialbb")?
        .constrain("catalog_name", Constraint::pattern("[A-Za-z0-9-]+")?)
        .describe("vendor catalog by short name")
        .step(StepTemplate::direct(
            &format!("{ZINC_FILES}/catalogs/source/{{catalog_name}}.src.txt"),
            "{catalog_name}.src.txt",
            smiles_id(),
        ));

    Ok(
        SourceDescriptor::new(Category::Compound, "zinc", "ZINC20", "10.1021/acs.jcim.0c00675")
            .pattern(building_blocks)
            .pattern(catalog),
    )
}

fn miscellaneous() -> SourceDescriptor {
    let moses = VersionPattern::literal("v_20201218_polykovskiy_d_et_al")
        .citation("10.3389/fphar.2020.565644")
        .describe("MOSES benchmarking set")
        .step(StepTemplate::direct(
            "https://media.githubusercontent.com/media/molecularsets/moses/master/data/dataset_v1.csv",
            "dataset_v1.csv",
            ParserSpec::Delimited(DelimitedConfig::comma().structure(&["SMILES"])),
        ));

    SourceDescriptor::new(
        Category::Compound,
        "miscellaneous",
        "Miscellaneous compound datasets",
        "10.3389/fphar.2020.565644",
    )
    .pattern(moses)
}
