use crate::domain::Category;
use crate::error::KiraError;
use crate::parsers::{DelimitedConfig, ParserSpec, ReactionSmilesConfig};
use crate::plan::{ArchiveFormat, StepTemplate};
use crate::registry::SourceDescriptor;
use crate::version::{Constraint, VersionPattern};

const FIGSHARE: &str = "https://figshare.com/ndownloader/files";
const REXGEN: &str = "https://raw.githubusercontent.com/wengong-jin/nips17-rexgen/master";
const BOX_DOWNLOAD_URL: &str = "/download_url";

/// Shared-folder listing of the IBM Box instance, which answers with the zip
/// download link in `download_url`.
fn ibm_box_folder(folder_id: &str, vanity_name: &str) -> String {
    format!(
        "https://ibm.ent.box.com/index.php?folder_id={folder_id}\
         &q[shared_item][vanity_name]={vanity_name}&rm=box_v2_zip_shared_folder"
    )
}

fn lines() -> ParserSpec {
    ParserSpec::ReactionSmiles(ReactionSmilesConfig::new())
}

pub(crate) fn descriptors() -> Result<Vec<SourceDescriptor>, KiraError> {
    Ok(vec![crd(), miscellaneous(), rhea()?, uspto()])
}

fn uspto() -> SourceDescriptor {
    let schneider = VersionPattern::literal("v_50k_by_20161122_schneider_n_et_al")
        .citation("10.1021/acs.jcim.6b00564")
        .step(
            StepTemplate::direct(
                "https://ndownloader.figstatic.com/files/7005749",
                "ci6b00564_si_002.zip",
                ParserSpec::Delimited(
                    DelimitedConfig::comma()
                        .id(&["PatentNo", "patent_no", "id"])
                        .structure(&["rxn_Smiles", "rxn_smiles", "reaction_smiles", "rxnSmiles"]),
                ),
            )
            .archive(ArchiveFormat::Zip)
            .members(&["data/dataSetA.csv", "data/dataSetB.csv"]),
        );

    let coley_15k = VersionPattern::literal("v_15k_by_20170418_coley_c_w_et_al")
        .citation("10.1021/acscentsci.7b00064")
        .step(
            StepTemplate::direct(&format!("{REXGEN}/USPTO-15K/data.zip"), "data.zip", lines())
                .archive(ArchiveFormat::Zip)
                .members(&["data/train.txt", "data/valid.txt", "data/test.txt"]),
        );

    let coley_50k = VersionPattern::literal("v_50k_by_20171116_coley_c_w_et_al")
        .citation("10.1021/acscentsci.7b00355")
        .step(StepTemplate::direct(
            "https://raw.githubusercontent.com/connorcoley/retrosim/master/retrosim/data/data_processed.csv",
            "data_processed.csv",
            ParserSpec::Delimited(
                DelimitedConfig::comma()
                    .id(&["id"])
                    .structure(&["rxn_smiles"])
                    .drop(&["", "Unnamed: 0"]),
            ),
        ));

    let jin = VersionPattern::literal("v_480k_or_mit_by_20171204_jin_w_et_al")
        .citation("10.48550/arXiv.1709.04555")
        .step(
            StepTemplate::direct(
                &format!("{REXGEN}/USPTO/data.zip"),
                "data.zip",
                ParserSpec::ReactionSmiles(ReactionSmilesConfig::new().trailing(&["edits"])),
            )
            .archive(ArchiveFormat::Zip)
            .members(&["data/train.txt", "data/valid.txt", "data/test.txt"]),
        );

    let seq2seq = ibm_box_folder("40552708120", "ReactionSeq2SeqDataset");
    let schwaller_mit = VersionPattern::literal("v_480k_or_mit_by_20180622_schwaller_p_et_al")
        .citation("10.1039/C8SC02339E")
        .step(
            StepTemplate::indirect(
                &seq2seq,
                BOX_DOWNLOAD_URL,
                "ReactionSeq2Seq_Dataset.zip",
                ParserSpec::ReactionSmiles(ReactionSmilesConfig::new().skip_lines(1)),
            )
            .archive(ArchiveFormat::Zip)
            .members(&[
                "ReactionSeq2Seq_Dataset/Jin_USPTO_1product_train.txt",
                "ReactionSeq2Seq_Dataset/Jin_USPTO_1product_valid.txt",
                "ReactionSeq2Seq_Dataset/Jin_USPTO_1product_test.txt",
            ]),
        );

    let schwaller_stereo = VersionPattern::literal("v_stereo_by_20180622_schwaller_p_et_al")
        .citation("10.1039/C8SC02339E")
        .step(
            StepTemplate::indirect(
                &seq2seq,
                BOX_DOWNLOAD_URL,
                "ReactionSeq2Seq_Dataset.zip",
                ParserSpec::Delimited(
                    DelimitedConfig::tab()
                        .skip_lines(2)
                        .id(&["PatentNumber", "Source"])
                        .structure(&["OriginalReaction", "CanonicalizedReaction", "ReactionSmiles"]),
                ),
            )
            .archive(ArchiveFormat::Zip)
            .members(&[
                "ReactionSeq2Seq_Dataset/US_patents_1976-Sep2016_1product_reactions_train.csv",
                "ReactionSeq2Seq_Dataset/US_patents_1976-Sep2016_1product_reactions_valid.csv",
                "ReactionSeq2Seq_Dataset/US_patents_1976-Sep2016_1product_reactions_test.csv",
            ]),
        );

    let schwaller_tpl = VersionPattern::literal("v_1k_tpl_by_20210128_schwaller_p_et_al")
        .citation("10.1038/s42256-020-00284-w")
        .step(
            StepTemplate::indirect(
                &ibm_box_folder("124192222443", "MappingChemicalReactions"),
                BOX_DOWNLOAD_URL,
                "MappingChemicalReactions.zip",
                ParserSpec::Delimited(
                    DelimitedConfig::tab()
                        .structure(&["canonical_rxn", "original_rxn"])
                        .drop(&[""]),
                ),
            )
            .archive(ArchiveFormat::Zip)
            .members(&[
                "data_set/uspto_1k_TPL_test.tsv",
                "data_set/uspto_1k_TPL_train_valid.tsv",
            ]),
        );

    let schwaller_remapped = VersionPattern::literal("v_1976_to_2016_by_20210407_schwaller_p_et_al")
        .citation("10.1126/sciadv.abe4166")
        .step(
            StepTemplate::indirect(
                &ibm_box_folder("112951098080", "RXNMapperData"),
                BOX_DOWNLOAD_URL,
                "USPTO_remapped.zip",
                ParserSpec::Delimited(
                    DelimitedConfig::tab()
                        .id(&["patent_no", "PatentNumber"])
                        .structure(&["mapped_rxn", "rxn", "original_rxn"])
                        .drop(&[""]),
                ),
            )
            .archive(ArchiveFormat::Zip)
            .members(&[
                "USPTO_remapped/1976_Sep2016_USPTOgrants_smiles_mapped.tsv",
                "USPTO_remapped/2001_Sep2016_USPTOapplications_smiles_mapped.tsv",
            ]),
        );

    let chen = |version: &str, file_id: &str, file_name: &str| {
        VersionPattern::literal(version)
            .citation("10.6084/m9.figshare.25046471.v1")
            .step(StepTemplate::direct(
                &format!("{FIGSHARE}/{file_id}"),
                file_name,
                ParserSpec::Delimited(
                    DelimitedConfig::comma()
                        .id(&["id", "reaction_id"])
                        .structure(&["mapped_rxn", "rxn_smiles", "reactions", "rxn"])
                        .drop(&[""]),
                ),
            ))
    };

    SourceDescriptor::new(
        Category::Reaction,
        "uspto",
        "United States Patent and Trademark Office reactions",
        "10.6084/m9.figshare.5104873.v1",
    )
    .pattern(schneider)
    .pattern(coley_15k)
    .pattern(coley_50k)
    .pattern(jin)
    .pattern(schwaller_mit)
    .pattern(schwaller_stereo)
    .pattern(schwaller_tpl)
    .pattern(schwaller_remapped)
    .pattern(chen(
        "v_1976_to_2016_by_20240313_chen_s_et_al",
        "44192531",
        "remapped_USPTO_FULL.csv",
    ))
    .pattern(chen(
        "v_50k_by_20240313_chen_s_et_al",
        "44192528",
        "remapped_USPTO_50K.csv",
    ))
}

fn rhea() -> Result<SourceDescriptor, KiraError> {
    let release = VersionPattern::parameterized("v_release_{release_number}", "v_release_126")?
        .constrain("release_number", Constraint::integer_at_least(126))
        .describe("archived Rhea release")
        .step(
            StepTemplate::direct(
                "https://ftp.expasy.org/databases/rhea/old_releases/{release_number}.tar.bz2",
                "{release_number}.tar.bz2",
                ParserSpec::Delimited(
                    DelimitedConfig::tab()
                        .headerless(&["id", "reaction_smiles"])
                        .id(&["id"])
                        .structure(&["reaction_smiles"]),
                ),
            )
            .archive(ArchiveFormat::TarBz2)
            .members(&["{release_number}/tsv/rhea-reaction-smiles.tsv"]),
        );

    Ok(
        SourceDescriptor::new(Category::Reaction, "rhea", "Rhea", "10.1093/nar/gkab1016")
            .pattern(release),
    )
}

fn crd() -> SourceDescriptor {
    let release = |version: &str, file_id: &str, file_name: &str, doi: &str| {
        VersionPattern::literal(version)
            .citation(doi)
            .partial("reaction SMILES only")
            .step(StepTemplate::direct(&format!("{FIGSHARE}/{file_id}"), file_name, lines()))
    };

    SourceDescriptor::new(
        Category::Reaction,
        "crd",
        "Chemical Reaction Database",
        "10.6084/m9.figshare.20279733.v1",
    )
    .pattern(release(
        "v_reaction_smiles_2001_to_2021",
        "36222051",
        "reactionSmilesFigShare.txt",
        "10.6084/m9.figshare.20279733.v1",
    ))
    .pattern(release(
        "v_reaction_smiles_2001_to_2023",
        "39944236",
        "reactionSmilesFigShare2023.txt",
        "10.6084/m9.figshare.22491730.v1",
    ))
    .pattern(release(
        "v_reaction_smiles_2023",
        "43858050",
        "reactionSmilesFigShareUSPTO2023.txt",
        "10.6084/m9.figshare.24921555.v1",
    ))
}

fn miscellaneous() -> SourceDescriptor {
    let wade = "https://raw.githubusercontent.com/jnwei/neural_reaction_fingerprint/master/data/test_questions";
    let wei = VersionPattern::literal("v_20161014_wei_j_n_et_al")
        .citation("10.1021/acscentsci.6b00219")
        .step(StepTemplate::direct(&format!("{wade}/Wade8_47.ans_smi.txt"), "Wade8_47.ans_smi.txt", lines()))
        .step(StepTemplate::direct(&format!("{wade}/Wade8_48.ans_smi.txt"), "Wade8_48.ans_smi.txt", lines()));

    let composed = || {
        ParserSpec::Delimited(DelimitedConfig::comma().id(&["idx"]).composed("rsmi", "psmi"))
    };
    let zenodo = |version: &str, record: &str, doi: &str, files: &[&str]| {
        files.iter().fold(VersionPattern::literal(version).citation(doi), |pattern, file| {
            pattern.step(StepTemplate::direct(
                &format!("https://zenodo.org/records/{record}/files/{file}"),
                file,
                composed(),
            ))
        })
    };

    SourceDescriptor::new(
        Category::Reaction,
        "miscellaneous",
        "Miscellaneous reaction datasets",
        "10.1021/acscentsci.6b00219",
    )
    .pattern(wei)
    .pattern(zenodo(
        "v_20200508_grambow_c_et_al",
        "3715478",
        "10.5281/zenodo.3581266",
        &["b97d3.csv", "wb97xd3.csv"],
    ))
    .pattern(zenodo(
        "v_20200508_grambow_c_et_al_add_on",
        "3731554",
        "10.5281/zenodo.3731553",
        &["b97d3_rad.csv", "wb97xd3_rad.csv"],
    ))
    .pattern(zenodo(
        "v_20220718_spiekermann_k_et_al",
        "6618262",
        "10.5281/zenodo.5652097",
        &["b97d3.csv", "wb97xd3.csv", "ccsdtf12_dz.csv", "ccsdtf12_tz.csv"],
    ))
}
